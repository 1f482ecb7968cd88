//! Domain models for cached provider data

mod credential;
mod record;
mod sync_run;
mod sync_state;

pub use credential::{Credential, TokenSet};
pub use record::{NewRecord, Record, RecordCount, UpsertOutcome};
pub use sync_run::{RunFinish, RunStatus, SyncRun, SyncRunStats};
pub use sync_state::{SyncState, SyncStateUpdate};
