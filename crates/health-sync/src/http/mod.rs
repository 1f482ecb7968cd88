//! Blocking HTTP with retry and backoff
//!
//! Uses synchronous HTTP (ureq) to be executor-agnostic. Vendor calls go
//! through [`RetryClient`], which classifies responses into retryable and
//! fatal failures.

mod client;
mod request;
mod transport;

pub use client::{RetryClient, backoff_delay, parse_retry_after};
pub use request::{HttpMethod, HttpRequest, HttpResponse};
pub use transport::{MAX_BODY_BYTES, Transport, UreqTransport};
