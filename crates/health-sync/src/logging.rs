//! Logging setup
//!
//! Library code only uses the `log` facade; binaries and tests call [`init`]
//! once to install `env_logger`.

use log::LevelFilter;

/// Install `env_logger` honoring `RUST_LOG`, defaulting to `info`.
///
/// Returns false if a logger was already installed.
pub fn init() -> bool {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}

/// Install `env_logger` at a fixed level, ignoring `RUST_LOG`
pub fn init_with_level(level: LevelFilter) -> bool {
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        let _ = init();
        assert!(!init());
        assert!(!init_with_level(LevelFilter::Debug));
        log::info!("[TEST] logger installed");
    }
}
