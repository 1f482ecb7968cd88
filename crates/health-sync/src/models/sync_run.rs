//! Audit trail of sync attempts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::UpsertOutcome;

/// Lifecycle of a sync run: `running → success` or `running → error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "error" => Ok(RunStatus::Error),
            other => anyhow::bail!("Unknown sync run status: {}", other),
        }
    }
}

/// Per-run counters, fed by the caller as records are processed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRunStats {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
    pub unchanged: u64,
}

impl SyncRunStats {
    pub fn add_upsert(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    /// Count a deletion; `false` means nothing was stored under that key
    pub fn add_delete(&mut self, deleted: bool) {
        if deleted {
            self.deleted += 1;
        }
    }

    /// Records whose stored content changed
    pub fn changed(&self) -> u64 {
        self.inserted + self.updated + self.deleted
    }
}

/// One audited attempt to sync a `(provider, resource)` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: i64,
    pub provider: String,
    pub resource: String,
    pub status: RunStatus,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub watermark_before: Option<String>,
    pub watermark_after: Option<String>,
    pub stats: SyncRunStats,
    pub error_text: Option<String>,
}

/// Terminal values written by [`crate::storage::SqliteStore::finish_sync_run`]
#[derive(Debug, Clone)]
pub struct RunFinish<'a> {
    pub status: RunStatus,
    pub stats: SyncRunStats,
    pub watermark_after: Option<&'a str>,
    pub error_text: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_accumulate() {
        let mut stats = SyncRunStats::default();
        stats.add_upsert(UpsertOutcome::Inserted);
        stats.add_upsert(UpsertOutcome::Unchanged);
        stats.add_upsert(UpsertOutcome::Updated);
        stats.add_delete(true);
        stats.add_delete(false);

        assert_eq!(
            stats,
            SyncRunStats {
                inserted: 1,
                updated: 1,
                deleted: 1,
                unchanged: 1,
            }
        );
        assert_eq!(stats.changed(), 3);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [RunStatus::Running, RunStatus::Success, RunStatus::Error] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert!("paused".parse::<RunStatus>().is_err());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Error.is_terminal());
    }
}
