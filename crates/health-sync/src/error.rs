//! Error taxonomy for the sync engine
//!
//! Fallible APIs return `anyhow::Result`. Errors that callers need to act on
//! are raised as [`SyncError`] values so they can be classified with
//! [`kind_of`] instead of inspecting message text.

use std::fmt;

/// Boxed cause carried inside [`SyncError`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Broad classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network failures, 429 and 5xx responses that outlived the retry budget.
    /// A later run may succeed without operator action.
    Transient,
    /// Configuration or authorization problems that will not self-resolve.
    FatalConfig,
    /// The remote side returned data we could not interpret.
    FatalData,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Transient => "transient",
            ErrorKind::FatalConfig => "fatal-config",
            ErrorKind::FatalData => "fatal-data",
        };
        f.write_str(s)
    }
}

/// Typed engine error
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Non-retryable HTTP status (4xx other than 429, or an unexpected status)
    #[error("HTTP {status} from {method} {url}: {message}{}", trace_suffix(.trace_id))]
    HttpStatus {
        method: String,
        url: String,
        status: u16,
        trace_id: Option<String>,
        message: String,
    },

    /// Every attempt failed with a retryable condition
    #[error("HTTP request failed after {attempts} attempts: {method} {url}")]
    RetriesExhausted {
        method: String,
        url: String,
        attempts: u32,
        #[source]
        source: BoxError,
    },

    /// A successful response whose body could not be read or decoded
    #[error("Failed to decode response body from {method} {url}")]
    InvalidBody {
        method: String,
        url: String,
        #[source]
        source: BoxError,
    },

    /// Missing, unusable or rejected credentials
    #[error("{message}{}", hint_suffix(.hint))]
    Credential {
        provider: String,
        message: String,
        hint: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    /// Missing or invalid configuration
    #[error("{message}{}", hint_suffix(.hint))]
    Config { message: String, hint: Option<String> },
}

fn trace_suffix(trace_id: &Option<String>) -> String {
    trace_id
        .as_deref()
        .map(|id| format!(" (trace id: {id})"))
        .unwrap_or_default()
}

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_deref().map(|h| format!(". {h}")).unwrap_or_default()
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::RetriesExhausted { .. } => ErrorKind::Transient,
            SyncError::InvalidBody { .. } => ErrorKind::FatalData,
            SyncError::HttpStatus { .. }
            | SyncError::Credential { .. }
            | SyncError::Config { .. } => ErrorKind::FatalConfig,
        }
    }

    /// Remediation hint for the operator, when one is known
    pub fn hint(&self) -> Option<&str> {
        match self {
            SyncError::Credential { hint, .. } | SyncError::Config { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }

    /// HTTP status code for status errors
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for statuses a token endpoint uses to reject a grant
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self.status(), Some(400 | 401 | 403))
    }

    pub fn config(message: impl Into<String>, hint: Option<String>) -> Self {
        SyncError::Config {
            message: message.into(),
            hint,
        }
    }

    pub fn credential(provider: &str, message: impl Into<String>, hint: impl Into<String>) -> Self {
        SyncError::Credential {
            provider: provider.to_string(),
            message: message.into(),
            hint: Some(hint.into()),
            source: None,
        }
    }
}

/// Classify an error chain by the first [`SyncError`] found in it
pub fn kind_of(err: &anyhow::Error) -> Option<ErrorKind> {
    find_sync_error(err).map(SyncError::kind)
}

/// Find the first [`SyncError`] in an error chain
pub fn find_sync_error(err: &anyhow::Error) -> Option<&SyncError> {
    err.chain().find_map(|cause| cause.downcast_ref::<SyncError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_kinds() {
        let status = SyncError::HttpStatus {
            method: "GET".into(),
            url: "https://api.example.test/v1".into(),
            status: 403,
            trace_id: None,
            message: "forbidden".into(),
        };
        assert_eq!(status.kind(), ErrorKind::FatalConfig);
        assert!(status.is_auth_rejection());

        let exhausted = SyncError::RetriesExhausted {
            method: "GET".into(),
            url: "https://api.example.test/v1".into(),
            attempts: 5,
            source: "connection reset".into(),
        };
        assert_eq!(exhausted.kind(), ErrorKind::Transient);
        assert!(!exhausted.is_auth_rejection());
    }

    #[test]
    fn test_display_includes_hint_and_trace() {
        let err =
            SyncError::credential("oura", "Missing oura credentials", "Run the auth flow for oura");
        assert_eq!(err.to_string(), "Missing oura credentials. Run the auth flow for oura");
        assert_eq!(err.hint(), Some("Run the auth flow for oura"));

        let err = SyncError::HttpStatus {
            method: "GET".into(),
            url: "https://x.test".into(),
            status: 404,
            trace_id: Some("abc".into()),
            message: "not found".into(),
        };
        assert_eq!(err.to_string(), "HTTP 404 from GET https://x.test: not found (trace id: abc)");
    }

    #[test]
    fn test_kind_of_walks_context() {
        let err: anyhow::Result<()> = Err(SyncError::config("Missing value", None).into());
        let err = err.context("Syncing oura").unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::FatalConfig));

        let plain = anyhow::anyhow!("plain failure");
        assert_eq!(kind_of(&plain), None);
    }
}
