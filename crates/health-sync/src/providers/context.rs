//! Dependencies handed to a provider for one invocation

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::{ProviderSettings, SyncConfig};
use crate::credentials::{CredentialGate, TokenRefresher};
use crate::error::SyncError;
use crate::http::RetryClient;
use crate::storage::SqliteStore;
use crate::watermark::{FetchWindow, fetch_window};

/// Store, HTTP client and configuration shared by providers
pub struct SyncContext<'a> {
    pub store: &'a SqliteStore,
    pub client: &'a RetryClient,
    pub config: &'a SyncConfig,
}

impl<'a> SyncContext<'a> {
    pub fn new(store: &'a SqliteStore, client: &'a RetryClient, config: &'a SyncConfig) -> Self {
        Self {
            store,
            client,
            config,
        }
    }

    pub fn provider_settings(&self, provider: &str) -> Result<&'a ProviderSettings> {
        self.config.require_provider(provider)
    }

    /// A non-empty setting, or a configuration error naming the missing key
    pub fn require_setting(&self, provider: &str, key: &str) -> Result<&'a str> {
        self.provider_settings(provider)?.setting(key).ok_or_else(|| {
            SyncError::config(
                format!("Missing {}.{} in configuration", provider, key),
                Some(format!("Set providers.{}.{} in the config file", provider, key)),
            )
            .into()
        })
    }

    /// Credential gate using the configured refresh skew
    pub fn credential_gate(&self, refresher: &'a dyn TokenRefresher) -> CredentialGate<'a> {
        CredentialGate::new(self.store, self.client, refresher)
            .with_skew(self.config.credential_skew())
    }

    /// Next fetch window for a resource from its watermark and the provider settings
    pub fn fetch_window(
        &self,
        provider: &str,
        resource: &str,
        now: DateTime<Utc>,
    ) -> Result<FetchWindow> {
        let settings = self.provider_settings(provider)?;
        let state = self.store.get_sync_state(provider, resource)?;
        Ok(fetch_window(
            state.as_ref().and_then(|s| s.watermark.as_deref()),
            settings.overlap,
            settings.start_boundary(),
            now,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, kind_of};
    use crate::models::SyncStateUpdate;
    use crate::watermark::parse_timestamp;
    use tempfile::tempdir;

    #[test]
    fn test_settings_and_fetch_window() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("health.test.sqlite")).unwrap();
        let client = RetryClient::with_timeout(std::time::Duration::from_secs(1));
        let config = SyncConfig::from_json(
            r#"{"providers": {"oura": {
                "enabled": true,
                "overlap": {"days": 2},
                "start_date": "2025-01-01",
                "base_url": "https://api.ouraring.test"
            }}}"#,
        )
        .unwrap();
        let ctx = SyncContext::new(&store, &client, &config);

        assert_eq!(ctx.require_setting("oura", "base_url").unwrap(), "https://api.ouraring.test");
        let err = ctx.require_setting("oura", "client_id").unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::FatalConfig));
        assert!(err.to_string().contains("oura.client_id"));

        let now = parse_timestamp("2026-02-20T00:00:00Z").unwrap();
        let window = ctx.fetch_window("oura", "daily_sleep", now).unwrap();
        assert_eq!(window.start_date(), "2025-01-01");

        store
            .set_sync_state("oura", "daily_sleep", &SyncStateUpdate::watermark("2026-02-18"))
            .unwrap();
        let window = ctx.fetch_window("oura", "daily_sleep", now).unwrap();
        assert_eq!(window.start_date(), "2026-02-16");
    }
}
