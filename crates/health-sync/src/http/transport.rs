//! Wire transport

use std::time::Duration;

use anyhow::{Context, Result};
use ureq::Agent;

use super::request::{HttpMethod, HttpRequest, HttpResponse};
use crate::error::SyncError;

/// Largest response body read into memory
pub const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

/// Sends one request and returns whatever status the server answered with.
///
/// Implementations return `Err` for transport failures (DNS, connect,
/// timeout, a dropped connection); HTTP error statuses are regular responses.
/// A body that can never be read, such as one over the size limit, is
/// reported as [`SyncError::InvalidBody`] and is not retried.
pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Default transport backed by a ureq agent
pub struct UreqTransport {
    agent: Agent,
    body_limit: u64,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            agent,
            body_limit: MAX_BODY_BYTES,
        }
    }

    pub fn body_limit(mut self, bytes: u64) -> Self {
        self.body_limit = bytes;
        self
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let query = request
            .query
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()));

        let response = match request.method {
            HttpMethod::Get | HttpMethod::Delete => {
                let mut builder = if request.method == HttpMethod::Get {
                    self.agent.get(&request.url)
                } else {
                    self.agent.delete(&request.url)
                };
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.query_pairs(query).call()
            }
            HttpMethod::Post => {
                let mut builder = self.agent.post(&request.url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                let builder = builder.query_pairs(query);
                match &request.form {
                    Some(form) => {
                        builder.send_form(form.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                    }
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = response
            .with_context(|| format!("Failed to send {} {}", request.method, request.url))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = match response
            .body_mut()
            .with_config()
            .limit(self.body_limit)
            .read_to_vec()
        {
            Ok(body) => body,
            Err(ureq::Error::BodyExceedsLimit(limit)) => {
                return Err(SyncError::InvalidBody {
                    method: request.method.to_string(),
                    url: request.url.clone(),
                    source: format!("body exceeds {} bytes", limit).into(),
                }
                .into());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read response body from {}", request.url));
            }
        };

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
