//! Access token gate

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};

use super::oauth::TokenRefresher;
use crate::error::{SyncError, find_sync_error};
use crate::http::RetryClient;
use crate::storage::SqliteStore;
use crate::watermark::parse_timestamp;

/// Tokens expiring within this many seconds are refreshed ahead of use
pub const DEFAULT_SKEW_SECS: i64 = 60;

/// Whether a token must be refreshed before use.
///
/// `None` never expires. An expiry that cannot be parsed counts as expired.
pub fn token_expiring_soon(expires_at: Option<&str>, now: DateTime<Utc>, skew: Duration) -> bool {
    match expires_at {
        None => false,
        Some(raw) => match parse_timestamp(raw) {
            Some(at) => now.checked_add_signed(skew).is_none_or(|limit| at <= limit),
            None => true,
        },
    }
}

/// Serves usable access tokens for one provider's refresh scheme
pub struct CredentialGate<'a> {
    store: &'a SqliteStore,
    client: &'a RetryClient,
    refresher: &'a dyn TokenRefresher,
    skew: Duration,
}

impl<'a> CredentialGate<'a> {
    pub fn new(
        store: &'a SqliteStore,
        client: &'a RetryClient,
        refresher: &'a dyn TokenRefresher,
    ) -> Self {
        Self {
            store,
            client,
            refresher,
            skew: Duration::seconds(DEFAULT_SKEW_SECS),
        }
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    /// Access token for `provider`, refreshing it first when it is about to expire
    pub fn get_usable_access_token(&self, provider: &str) -> Result<String> {
        self.get_usable_access_token_at(provider, Utc::now())
    }

    pub fn get_usable_access_token_at(&self, provider: &str, now: DateTime<Utc>) -> Result<String> {
        let Some(credential) = self.store.get_credential(provider)? else {
            return Err(SyncError::credential(
                provider,
                format!("Missing credentials for {}", provider),
                format!("Run the auth flow for {}", provider),
            )
            .into());
        };

        if !token_expiring_soon(credential.expires_at.as_deref(), now, self.skew) {
            return Ok(credential.access_token);
        }

        let Some(refresh_token) = credential.refresh_token.clone().filter(|t| !t.is_empty()) else {
            return Err(SyncError::credential(
                provider,
                format!("Access token for {} expired and no refresh token is stored", provider),
                format!("Re-run the auth flow for {}", provider),
            )
            .into());
        };

        info!("[AUTH] Refreshing access token for {}", provider);
        let response = match self.refresher.refresh(self.client, &credential, &refresh_token) {
            Ok(response) => response,
            Err(err) => {
                if find_sync_error(&err).is_some_and(SyncError::is_auth_rejection) {
                    warn!("[AUTH] Token refresh for {} was rejected: {:#}", provider, err);
                    return Err(SyncError::Credential {
                        provider: provider.to_string(),
                        message: format!("Token refresh for {} was rejected", provider),
                        hint: Some(format!(
                            "The refresh token may be revoked or expired; \
                             re-run the auth flow for {}",
                            provider
                        )),
                        source: Some(err.into()),
                    }
                    .into());
                }
                return Err(err);
            }
        };

        let tokens = response.into_token_set(&credential, now);
        let access_token = tokens.access_token.clone();
        self.store
            .transaction(|| self.store.set_credential(provider, &tokens))?;
        debug!(
            "[AUTH] Stored refreshed token for {} (expires {})",
            provider,
            tokens.expires_at.as_deref().unwrap_or("never")
        );

        Ok(access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::TokenResponse;
    use crate::error::{ErrorKind, kind_of};
    use crate::http::{HttpRequest, HttpResponse, Transport};
    use crate::models::{Credential, TokenSet};
    use serde_json::json;
    use std::cell::Cell;
    use tempfile::tempdir;

    struct NoTransport;

    impl Transport for NoTransport {
        fn send(&self, _request: &HttpRequest) -> Result<HttpResponse> {
            anyhow::bail!("network disabled in tests")
        }
    }

    /// Returns a canned outcome and counts calls
    struct FakeRefresher {
        calls: Cell<u32>,
        status: Option<u16>,
    }

    impl FakeRefresher {
        fn ok() -> Self {
            Self {
                calls: Cell::new(0),
                status: None,
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                calls: Cell::new(0),
                status: Some(status),
            }
        }
    }

    impl TokenRefresher for FakeRefresher {
        fn refresh(
            &self,
            _client: &RetryClient,
            _credential: &Credential,
            refresh_token: &str,
        ) -> Result<TokenResponse> {
            self.calls.set(self.calls.get() + 1);
            assert_eq!(refresh_token, "r-old");
            if let Some(status) = self.status {
                return Err(SyncError::HttpStatus {
                    method: "POST".into(),
                    url: "https://auth.example.test/token".into(),
                    status,
                    trace_id: None,
                    message: "invalid_grant".into(),
                }
                .into());
            }
            Ok(serde_json::from_value(json!({"access_token": "new", "expires_in": 3600}))?)
        }
    }

    fn now() -> DateTime<Utc> {
        parse_timestamp("2026-02-10T00:00:00Z").unwrap()
    }

    fn setup(
        expires_at: Option<&str>,
        refresh_token: Option<&str>,
    ) -> (SqliteStore, RetryClient, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("health.test.sqlite")).unwrap();
        let mut tokens = TokenSet::bearer("old");
        tokens.expires_at = expires_at.map(str::to_string);
        tokens.refresh_token = refresh_token.map(str::to_string);
        store.set_credential("withings", &tokens).unwrap();
        (store, RetryClient::new(Box::new(NoTransport)), dir)
    }

    #[test]
    fn test_token_expiring_soon() {
        let skew = Duration::seconds(60);
        assert!(!token_expiring_soon(None, now(), skew));
        assert!(token_expiring_soon(Some("2026-02-10T00:00:30Z"), now(), skew));
        assert!(!token_expiring_soon(Some("2026-02-10T00:05:00Z"), now(), skew));
        assert!(token_expiring_soon(Some("garbage"), now(), skew));
        assert!(token_expiring_soon(Some("9999-12-31T23:59:59Z"), now(), Duration::MAX));
    }

    #[test]
    fn test_valid_token_is_served_from_cache() {
        let (store, client, _dir) = setup(Some("2026-02-10T00:05:00Z"), Some("r-old"));
        let refresher = FakeRefresher::ok();
        let gate = CredentialGate::new(&store, &client, &refresher);

        assert_eq!(gate.get_usable_access_token_at("withings", now()).unwrap(), "old");
        assert_eq!(refresher.calls.get(), 0);
    }

    #[test]
    fn test_static_token_never_refreshes() {
        let (store, client, _dir) = setup(None, None);
        let refresher = FakeRefresher::ok();
        let gate = CredentialGate::new(&store, &client, &refresher);

        assert_eq!(gate.get_usable_access_token_at("withings", now()).unwrap(), "old");
        assert_eq!(refresher.calls.get(), 0);
    }

    #[test]
    fn test_expiring_token_is_refreshed_and_persisted() {
        let (store, client, _dir) = setup(Some("2026-02-10T00:00:30Z"), Some("r-old"));
        let refresher = FakeRefresher::ok();
        let gate = CredentialGate::new(&store, &client, &refresher);

        assert_eq!(gate.get_usable_access_token_at("withings", now()).unwrap(), "new");
        assert_eq!(refresher.calls.get(), 1);

        let stored = store.get_credential("withings").unwrap().unwrap();
        assert_eq!(stored.access_token, "new");
        assert_eq!(stored.refresh_token.as_deref(), Some("r-old"));
        assert_eq!(stored.expires_at.as_deref(), Some("2026-02-10T01:00:00Z"));
    }

    #[test]
    fn test_missing_credentials_is_fatal_config() {
        let (store, client, _dir) = setup(None, None);
        let refresher = FakeRefresher::ok();
        let gate = CredentialGate::new(&store, &client, &refresher);

        let err = gate.get_usable_access_token_at("oura", now()).unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::FatalConfig));
        assert!(err.to_string().contains("Run the auth flow for oura"));
    }

    #[test]
    fn test_expired_without_refresh_token_is_fatal() {
        let (store, client, _dir) = setup(Some("2026-02-09T00:00:00Z"), None);
        let refresher = FakeRefresher::ok();
        let gate = CredentialGate::new(&store, &client, &refresher);

        let err = gate.get_usable_access_token_at("withings", now()).unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::FatalConfig));
        assert_eq!(refresher.calls.get(), 0);
    }

    #[test]
    fn test_rejected_refresh_becomes_credential_error() {
        let (store, client, _dir) = setup(Some("2026-02-09T00:00:00Z"), Some("r-old"));
        let refresher = FakeRefresher::failing(400);
        let gate = CredentialGate::new(&store, &client, &refresher);

        let err = gate.get_usable_access_token_at("withings", now()).unwrap_err();
        let sync_err = find_sync_error(&err).unwrap();
        assert!(matches!(sync_err, SyncError::Credential { .. }));
        assert!(sync_err.hint().unwrap().contains("re-run the auth flow"));
        assert_eq!(store.get_credential("withings").unwrap().unwrap().access_token, "old");
    }

    #[test]
    fn test_server_failure_during_refresh_propagates() {
        let (store, client, _dir) = setup(Some("2026-02-09T00:00:00Z"), Some("r-old"));
        let refresher = FakeRefresher::failing(503);
        let gate = CredentialGate::new(&store, &client, &refresher);

        let err = gate.get_usable_access_token_at("withings", now()).unwrap_err();
        assert_eq!(find_sync_error(&err).unwrap().status(), Some(503));
    }
}
