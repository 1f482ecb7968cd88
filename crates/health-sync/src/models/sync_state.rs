//! Sync state tracking for incremental provider sync

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::watermark;

/// Tracks sync progress for one `(provider, resource)` pair
///
/// Persisted separately from records to enable incremental sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub provider: String,
    pub resource: String,
    /// Canonical UTC timestamp, or an opaque vendor cursor
    pub watermark: Option<String>,
    /// Vendor pagination token for resumption
    pub cursor: Option<String>,
    /// Free-form metadata (e.g. discovered endpoint URLs)
    pub extra: Option<Value>,
    /// When this row was last written
    pub updated_at: String,
}

impl SyncState {
    /// Watermark as Unix epoch seconds, for vendors that page by epoch
    pub fn watermark_epoch(&self) -> Option<i64> {
        self.watermark.as_deref().and_then(watermark::to_epoch_seconds)
    }

    /// Look up a string value in `extra`
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.as_ref()?.get(key)?.as_str()
    }
}

/// Values written by [`crate::storage::SqliteStore::set_sync_state`]
#[derive(Debug, Clone, Default)]
pub struct SyncStateUpdate<'a> {
    /// Normalized before persisting; opaque cursors pass through
    pub watermark: Option<&'a str>,
    pub cursor: Option<&'a str>,
    pub extra: Option<&'a Value>,
}

impl<'a> SyncStateUpdate<'a> {
    pub fn watermark(watermark: &'a str) -> Self {
        Self {
            watermark: Some(watermark),
            ..Default::default()
        }
    }

    pub fn with_cursor(mut self, cursor: Option<&'a str>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn with_extra(mut self, extra: Option<&'a Value>) -> Self {
        self.extra = extra;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_state(watermark: Option<&str>) -> SyncState {
        SyncState {
            provider: "withings".to_string(),
            resource: "activity".to_string(),
            watermark: watermark.map(str::to_string),
            cursor: None,
            extra: Some(json!({"endpoint": "https://wbsapi.example.test"})),
            updated_at: "2026-02-12T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_watermark_epoch() {
        assert_eq!(make_state(Some("2026-02-10T09:30:52Z")).watermark_epoch(), Some(1770715852));
        assert_eq!(make_state(Some("opaque-cursor")).watermark_epoch(), None);
        assert_eq!(make_state(None).watermark_epoch(), None);
    }

    #[test]
    fn test_extra_str() {
        let state = make_state(None);
        assert_eq!(state.extra_str("endpoint"), Some("https://wbsapi.example.test"));
        assert_eq!(state.extra_str("missing"), None);
    }

    #[test]
    fn test_serialization() {
        let state = make_state(Some("2026-02-10T09:30:52Z"));
        let json = serde_json::to_string(&state).unwrap();
        let deserialized: SyncState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }
}
