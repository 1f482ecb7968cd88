//! OAuth2 refresh-token grant

use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::http::{HttpRequest, RetryClient};
use crate::models::{Credential, TokenSet};
use crate::watermark::format_canonical;

/// Stored expiry for lifetimes that run past the four-digit years
const EXPIRY_CEILING: &str = "9999-12-31T23:59:59Z";

/// Token response fields every OAuth2 server uses; everything else is vendor extra
const STANDARD_FIELDS: &[&str] = &[
    "access_token",
    "refresh_token",
    "token_type",
    "scope",
    "expires_in",
    "expires_at",
];

/// Exchanges a refresh token for new token material
pub trait TokenRefresher {
    fn refresh(&self, client: &RetryClient, credential: &Credential, refresh_token: &str)
    -> Result<TokenResponse>;
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    /// Lifetime in seconds; some vendors send it as a string
    #[serde(default)]
    pub expires_in: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenResponse {
    pub fn expires_in_secs(&self) -> Option<i64> {
        match self.expires_in.as_ref()? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Token set to persist after a refresh.
    ///
    /// The previous refresh token is kept when the server omits one, and the
    /// previous vendor extras are merged with the new ones.
    pub fn into_token_set(self, previous: &Credential, now: DateTime<Utc>) -> TokenSet {
        let expires_at = self.expires_in_secs().map(|secs| expiry_after(now, secs));

        let mut extra = previous
            .extra
            .as_ref()
            .map(token_extra)
            .unwrap_or_default();
        extra.extend(
            self.extra
                .into_iter()
                .filter(|(key, _)| !STANDARD_FIELDS.contains(&key.as_str())),
        );

        TokenSet {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .filter(|t| !t.is_empty())
                .or_else(|| previous.refresh_token.clone()),
            token_type: self.token_type.or_else(|| previous.token_type.clone()),
            scope: self.scope.or_else(|| previous.scope.clone()),
            expires_at,
            extra: (!extra.is_empty()).then_some(Value::Object(extra)),
        }
    }
}

/// Non-standard fields of a token payload
pub fn token_extra(payload: &Value) -> Map<String, Value> {
    payload
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(key, _)| !STANDARD_FIELDS.contains(&key.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// How client credentials are presented to the token endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuth {
    /// `Authorization: Basic base64(id:secret)`
    Basic,
    /// `client_id` / `client_secret` form fields
    Body,
}

/// Standard `grant_type=refresh_token` refresher
#[derive(Debug, Clone)]
pub struct OAuthRefresher {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub client_auth: ClientAuth,
}

impl OAuthRefresher {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        client_auth: ClientAuth,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            client_auth,
        }
    }

    /// Build the refresh request; `extra["token_endpoint"]` overrides the URL
    pub fn build_request(&self, credential: &Credential, refresh_token: &str) -> HttpRequest {
        let url = credential
            .extra_str("token_endpoint")
            .unwrap_or(&self.token_url);

        let mut form = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token.to_string()),
        ];

        let request = HttpRequest::post(url).header("Accept", "application/json");
        let request = match self.client_auth {
            ClientAuth::Basic => {
                let encoded = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
                request.header("Authorization", format!("Basic {}", encoded))
            }
            ClientAuth::Body => {
                form.push(("client_id".to_string(), self.client_id.clone()));
                form.push(("client_secret".to_string(), self.client_secret.clone()));
                request
            }
        };

        request.form(form)
    }
}

impl TokenRefresher for OAuthRefresher {
    fn refresh(
        &self,
        client: &RetryClient,
        credential: &Credential,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        client.request_json(&self.build_request(credential, refresh_token))
    }
}

/// Canonical expiry `secs` after `now`; a negative lifetime means already expired
fn expiry_after(now: DateTime<Utc>, secs: i64) -> String {
    match Duration::try_seconds(secs.max(0)).and_then(|d| now.checked_add_signed(d)) {
        Some(at) if at.year() <= 9999 => format_canonical(at),
        _ => EXPIRY_CEILING.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TOKEN_URL: &str = "https://auth.example.test/token";

    fn credential(extra: Option<Value>) -> Credential {
        Credential {
            provider: "withings".to_string(),
            access_token: "old".to_string(),
            refresh_token: Some("r-old".to_string()),
            token_type: Some("Bearer".to_string()),
            scope: Some("user.activity".to_string()),
            expires_at: Some("2026-02-10T00:00:00Z".to_string()),
            obtained_at: "2026-02-09T21:00:00Z".to_string(),
            extra,
        }
    }

    #[test]
    fn test_into_token_set_keeps_refresh_token_and_merges_extra() {
        let response: TokenResponse = serde_json::from_value(json!({
            "access_token": "new",
            "expires_in": 10800,
            "userid": "42"
        }))
        .unwrap();
        let previous = credential(Some(json!({
            "token_endpoint": "https://x.test/token",
            "access_token": "stale"
        })));
        let now = DateTime::parse_from_rfc3339("2026-02-10T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let tokens = response.into_token_set(&previous, now);
        assert_eq!(tokens.access_token, "new");
        assert_eq!(tokens.refresh_token.as_deref(), Some("r-old"));
        assert_eq!(tokens.expires_at.as_deref(), Some("2026-02-10T03:00:00Z"));
        assert_eq!(
            tokens.extra,
            Some(json!({"token_endpoint": "https://x.test/token", "userid": "42"}))
        );
    }

    #[test]
    fn test_expires_in_as_string() {
        let response: TokenResponse =
            serde_json::from_value(json!({"access_token": "a", "expires_in": "3600"})).unwrap();
        assert_eq!(response.expires_in_secs(), Some(3600));

        let response: TokenResponse = serde_json::from_value(json!({"access_token": "a"})).unwrap();
        assert_eq!(response.expires_in_secs(), None);
    }

    #[test]
    fn test_out_of_range_expires_in() {
        let now = DateTime::parse_from_rfc3339("2026-02-10T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let response: TokenResponse =
            serde_json::from_value(json!({"access_token": "a", "expires_in": 9007199254740993u64}))
                .unwrap();
        let tokens = response.into_token_set(&credential(None), now);
        assert_eq!(tokens.expires_at.as_deref(), Some("9999-12-31T23:59:59Z"));

        let response: TokenResponse =
            serde_json::from_value(json!({"access_token": "a", "expires_in": -30})).unwrap();
        let tokens = response.into_token_set(&credential(None), now);
        assert_eq!(tokens.expires_at.as_deref(), Some("2026-02-10T00:00:00Z"));

        let response: TokenResponse =
            serde_json::from_value(json!({"access_token": "a", "expires_in": 1e300})).unwrap();
        let tokens = response.into_token_set(&credential(None), now);
        assert_eq!(tokens.expires_at.as_deref(), Some("9999-12-31T23:59:59Z"));
    }

    #[test]
    fn test_build_request_basic_auth() {
        let refresher = OAuthRefresher::new(TOKEN_URL, "id", "secret", ClientAuth::Basic);
        let request = refresher.build_request(&credential(None), "r-old");

        assert_eq!(request.url, "https://auth.example.test/token");
        assert!(
            request
                .headers
                .contains(&("Authorization".to_string(), "Basic aWQ6c2VjcmV0".to_string()))
        );
        let form = request.form.unwrap();
        assert!(form.contains(&("grant_type".to_string(), "refresh_token".to_string())));
        assert!(!form.iter().any(|(k, _)| k == "client_secret"));
    }

    #[test]
    fn test_build_request_body_auth_and_endpoint_override() {
        let refresher = OAuthRefresher::new(TOKEN_URL, "id", "secret", ClientAuth::Body);
        let previous = credential(Some(json!({"token_endpoint": "https://eu.example.test/token"})));
        let request = refresher.build_request(&previous, "r-old");

        assert_eq!(request.url, "https://eu.example.test/token");
        let form = request.form.unwrap();
        assert!(form.contains(&("client_id".to_string(), "id".to_string())));
        assert!(form.contains(&("client_secret".to_string(), "secret".to_string())));
    }

    #[test]
    fn test_token_extra_strips_standard_fields() {
        let extra = token_extra(&json!({"access_token": "a", "expires_in": 1, "user_id": 9}));
        assert_eq!(Value::Object(extra), json!({"user_id": 9}));
    }
}
