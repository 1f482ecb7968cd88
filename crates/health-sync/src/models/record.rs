//! Cached vendor records

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One vendor item cached locally, keyed by `(provider, resource, record_id)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub provider: String,
    pub resource: String,
    pub record_id: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub source_updated_at: Option<String>,
    pub payload: Value,
    pub fetched_at: String,
}

/// Input for [`crate::storage::SqliteStore::upsert_record`]
#[derive(Debug, Clone)]
pub struct NewRecord<'a> {
    pub provider: &'a str,
    pub resource: &'a str,
    pub record_id: &'a str,
    pub payload: &'a Value,
    pub start_time: Option<&'a str>,
    pub end_time: Option<&'a str>,
    pub source_updated_at: Option<&'a str>,
    /// Capture timestamp; defaults to now
    pub fetched_at: Option<&'a str>,
}

impl<'a> NewRecord<'a> {
    pub fn new(
        provider: &'a str,
        resource: &'a str,
        record_id: &'a str,
        payload: &'a Value,
    ) -> Self {
        Self {
            provider,
            resource,
            record_id,
            payload,
            start_time: None,
            end_time: None,
            source_updated_at: None,
            fetched_at: None,
        }
    }

    pub fn start_time(mut self, start_time: Option<&'a str>) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn end_time(mut self, end_time: Option<&'a str>) -> Self {
        self.end_time = end_time;
        self
    }

    pub fn source_updated_at(mut self, source_updated_at: Option<&'a str>) -> Self {
        self.source_updated_at = source_updated_at;
        self
    }

    pub fn fetched_at(mut self, fetched_at: Option<&'a str>) -> Self {
        self.fetched_at = fetched_at;
        self
    }
}

/// How an upsert changed the stored content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Inserted => "inserted",
            UpsertOutcome::Updated => "updated",
            UpsertOutcome::Unchanged => "unchanged",
        }
    }
}

/// Record count for one `(provider, resource)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCount {
    pub provider: String,
    pub resource: String,
    pub count: u64,
}
