//! Bearer credentials cached per provider

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::watermark;

/// A stored credential; at most one per provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub provider: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    /// Canonical UTC timestamp, `None` for non-expiring credentials
    pub expires_at: Option<String>,
    pub obtained_at: String,
    /// Vendor-specific token response fields
    pub extra: Option<Value>,
}

impl Credential {
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        self.expires_at.as_deref().and_then(watermark::parse_timestamp)
    }

    /// Static credentials never expire and cannot be refreshed
    pub fn is_static(&self) -> bool {
        self.expires_at.is_none() && self.refresh_token.is_none()
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.as_ref()?.get(key)?.as_str()
    }
}

/// Token material written by the auth flow or the refresh path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub expires_at: Option<String>,
    pub extra: Option<Value>,
}

impl TokenSet {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: Some("Bearer".to_string()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_credential(expires_at: Option<&str>, refresh_token: Option<&str>) -> Credential {
        Credential {
            provider: "oura".to_string(),
            access_token: "access".to_string(),
            refresh_token: refresh_token.map(str::to_string),
            token_type: Some("Bearer".to_string()),
            scope: None,
            expires_at: expires_at.map(str::to_string),
            obtained_at: "2026-02-12T00:00:00Z".to_string(),
            extra: None,
        }
    }

    #[test]
    fn test_expires_at_utc() {
        let cred = make_credential(Some("2026-02-18T00:10:00Z"), None);
        assert_eq!(cred.expires_at_utc().unwrap().timestamp(), 1771373400);
        assert!(make_credential(Some("garbage"), None).expires_at_utc().is_none());
    }

    #[test]
    fn test_is_static() {
        assert!(make_credential(None, None).is_static());
        assert!(!make_credential(Some("2026-02-18T00:10:00Z"), None).is_static());
        assert!(!make_credential(None, Some("refresh")).is_static());
    }

    #[test]
    fn test_bearer_token_set() {
        let tokens = TokenSet::bearer("abc");
        assert_eq!(tokens.access_token, "abc");
        assert_eq!(tokens.token_type.as_deref(), Some("Bearer"));
        assert!(tokens.refresh_token.is_none());
    }
}
