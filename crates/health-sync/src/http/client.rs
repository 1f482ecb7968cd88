//! Retry/backoff policy around a [`Transport`]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::request::{HttpRequest, HttpResponse};
use super::transport::{Transport, UreqTransport};
use crate::config::HttpSettings;
use crate::error::{BoxError, ErrorKind, SyncError, kind_of};

/// Upper bound for any single wait, in seconds
const MAX_DELAY_SECS: u64 = 60;

/// Longest raw body excerpt carried in an error message
const MAX_ERROR_BODY_CHARS: usize = 500;

type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// HTTP client that retries transient failures.
///
/// Transport errors, 429 and 5xx responses are retried up to
/// `max_attempts` times; everything else fails immediately.
pub struct RetryClient {
    transport: Box<dyn Transport>,
    max_attempts: u32,
    sleeper: Sleeper,
}

impl RetryClient {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            sleeper: Arc::new(std::thread::sleep),
        }
    }

    /// Client over the default ureq transport
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(Box::new(UreqTransport::new(timeout)))
    }

    /// Client configured from the `http` section of [`SyncConfig`](crate::SyncConfig)
    pub fn from_settings(settings: &HttpSettings) -> Self {
        Self::with_timeout(settings.timeout()).max_attempts(settings.max_attempts)
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Replace the blocking sleep, e.g. to record delays in tests
    pub fn sleeper(mut self, sleeper: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Send `request` and decode a successful JSON body into `T`
    pub fn request_json<T: DeserializeOwned>(&self, request: &HttpRequest) -> Result<T> {
        let response = self.send(request)?;
        decode_json(&response.body).map_err(|source| {
            SyncError::InvalidBody {
                method: request.method.to_string(),
                url: request.url.clone(),
                source,
            }
            .into()
        })
    }

    /// Send `request` and return the decoded JSON body
    pub fn request(&self, request: &HttpRequest) -> Result<Value> {
        self.request_json(request)
    }

    /// Send `request`, retrying per policy, and return the first 2xx response
    pub fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut last_failure: Option<BoxError> = None;

        for attempt in 1..=self.max_attempts {
            let is_last = attempt == self.max_attempts;

            let delay = match self.transport.send(request) {
                // An unreadable body is not a network failure
                Err(e) if kind_of(&e) == Some(ErrorKind::FatalData) => return Err(e),
                Err(e) => {
                    warn!(
                        "[HTTP] {} {} failed (attempt {}/{}): {:#}",
                        request.method, request.url, attempt, self.max_attempts, e
                    );
                    last_failure = Some(e.into());
                    backoff_delay(attempt - 1)
                }
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) if response.status == 429 => {
                    let delay = match response.header("retry-after") {
                        Some(raw) => parse_retry_after(raw, Utc::now()).unwrap_or_else(|| {
                            warn!("[HTTP] Unparseable Retry-After {:?}; using backoff", raw);
                            backoff_delay(attempt - 1)
                        }),
                        None => backoff_delay(attempt - 1),
                    };
                    warn!(
                        "[HTTP] Rate limited by {} (attempt {}/{})",
                        request.url, attempt, self.max_attempts
                    );
                    last_failure = Some(status_error(request, &response).into());
                    delay
                }
                Ok(response) if response.status >= 500 => {
                    warn!(
                        "[HTTP] {} from {} (attempt {}/{})",
                        response.status, request.url, attempt, self.max_attempts
                    );
                    last_failure = Some(status_error(request, &response).into());
                    backoff_delay(attempt - 1)
                }
                Ok(response) => return Err(status_error(request, &response).into()),
            };

            if !is_last {
                debug!("[HTTP] Retrying {} in {}s", request.url, delay.as_secs());
                (self.sleeper)(delay);
            }
        }

        let source = last_failure.unwrap_or_else(|| "no attempts were made".into());
        Err(SyncError::RetriesExhausted {
            method: request.method.to_string(),
            url: request.url.clone(),
            attempts: self.max_attempts,
            source,
        }
        .into())
    }
}

/// Wait after the failed attempt numbered from zero: `min(60, 2^attempt)` seconds,
/// so 1, 2, 4, 8, ...
pub fn backoff_delay(attempt: u32) -> Duration {
    let secs = 2u64
        .checked_pow(attempt)
        .unwrap_or(MAX_DELAY_SECS)
        .min(MAX_DELAY_SECS);
    Duration::from_secs(secs)
}

/// Parse a `Retry-After` value (delta seconds or HTTP-date), clamped to 1..=60 seconds
pub fn parse_retry_after(raw: &str, now: DateTime<Utc>) -> Option<Duration> {
    let raw = raw.trim();
    let secs = if let Ok(secs) = raw.parse::<f64>() {
        if !secs.is_finite() {
            return None;
        }
        secs.ceil() as i64
    } else {
        let at = DateTime::parse_from_rfc2822(raw).ok()?;
        (at.with_timezone(&Utc) - now).num_seconds()
    };

    Some(Duration::from_secs(secs.clamp(1, MAX_DELAY_SECS as i64) as u64))
}

fn status_error(request: &HttpRequest, response: &HttpResponse) -> SyncError {
    let trace_id = response
        .header("x-trace-id")
        .or_else(|| response.header("x-request-id"))
        .map(str::to_string);

    SyncError::HttpStatus {
        method: request.method.to_string(),
        url: request.url.clone(),
        status: response.status,
        trace_id,
        message: error_message(&response.text_lossy()),
    }
}

/// UTF-8 then JSON; an empty body decodes as `null`
fn decode_json<T: DeserializeOwned>(body: &[u8]) -> std::result::Result<T, BoxError> {
    let text = std::str::from_utf8(body)?;
    let text = if text.trim().is_empty() { "null" } else { text };
    Ok(serde_json::from_str(text)?)
}

/// Best-effort error text from a response body
fn error_message(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        let parts: Vec<String> = ["error", "error_description", "detail", "message"]
            .iter()
            .filter_map(|key| map.get(*key))
            .filter_map(|value| match value {
                Value::Null => None,
                Value::String(s) if s.is_empty() => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect();
        if !parts.is_empty() {
            return parts.join(": ");
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
