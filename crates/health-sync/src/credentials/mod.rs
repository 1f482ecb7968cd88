//! Credential cache and refresh gate
//!
//! Provider fetchers ask the [`CredentialGate`] for a bearer token; it serves
//! the cached token while it is comfortably valid and refreshes it through a
//! [`TokenRefresher`] otherwise.

mod gate;
mod oauth;

pub use gate::{CredentialGate, DEFAULT_SKEW_SECS, token_expiring_soon};
pub use oauth::{ClientAuth, OAuthRefresher, TokenRefresher, TokenResponse, token_extra};
