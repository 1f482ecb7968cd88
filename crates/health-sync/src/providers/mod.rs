//! Provider plumbing
//!
//! Each vendor integration implements [`Provider`]. The [`ProviderRegistry`]
//! resolves ids to implementations and [`sync_providers`] runs the enabled
//! ones, isolating failures per provider.

mod context;
mod registry;
mod runner;

use anyhow::Result;

use crate::error::SyncError;

pub use context::SyncContext;
pub use registry::{ProviderRegistry, RegistrationSource};
pub use runner::{ProviderOutcome, ProviderStatus, SyncReport, sync_providers};

/// A vendor integration
pub trait Provider {
    /// Stable identifier used in config and storage keys (e.g. `oura`)
    fn id(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Whether [`Provider::auth`] runs an interactive auth flow
    fn supports_auth(&self) -> bool {
        false
    }

    /// Fetch every resource this provider knows about into the store
    fn sync(&self, ctx: &SyncContext<'_>) -> Result<()>;

    /// Obtain and store initial credentials
    fn auth(&self, _ctx: &SyncContext<'_>) -> Result<()> {
        Err(SyncError::config(
            format!("Provider {} does not support auth", self.id()),
            None,
        )
        .into())
    }
}
