//! Sync run controller
//!
//! Wraps one resource's sync attempt in an audit record and, for
//! [`sync_run`], a store transaction.

mod run;

pub use run::{audit_run, sync_run};
