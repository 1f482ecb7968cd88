//! health-sync - Local cache of personal health and fitness data
//!
//! This crate provides the synchronization engine that vendor integrations
//! build on:
//! - Durable SQLite store (records, sync state, credentials, run audit)
//! - Watermark normalization and incremental fetch windows
//! - Idempotent upsert with change classification
//! - Audited, transactional sync runs
//! - Credential cache with token refresh
//! - Blocking HTTP client with retry/backoff
//! - Provider registry and multi-provider runner
//!
//! Everything is synchronous and executor-agnostic.

pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod logging;
pub mod models;
pub mod providers;
pub mod storage;
pub mod sync;
pub mod upsert;
pub mod watermark;

pub use config::{HttpSettings, ProviderSettings, SyncConfig};
pub use credentials::{ClientAuth, CredentialGate, OAuthRefresher, TokenRefresher, TokenResponse};
pub use error::{ErrorKind, SyncError, kind_of};
pub use http::{HttpMethod, HttpRequest, HttpResponse, RetryClient, Transport, UreqTransport};
pub use models::{
    Credential, NewRecord, Record, RecordCount, RunFinish, RunStatus, SyncRun, SyncRunStats,
    SyncState, SyncStateUpdate, TokenSet, UpsertOutcome,
};
pub use providers::{
    Provider, ProviderOutcome, ProviderRegistry, ProviderStatus, RegistrationSource, SyncContext,
    SyncReport, sync_providers,
};
pub use storage::SqliteStore;
pub use sync::{audit_run, sync_run};
pub use upsert::{ItemKeys, delete_item, record_id_for, upsert_item};
pub use watermark::{FetchWindow, Overlap, fetch_window, normalize};
