//! Audited sync runs

use anyhow::Result;
use log::{debug, error, info};

use crate::models::{RunFinish, RunStatus, SyncRunStats};
use crate::storage::SqliteStore;

/// Run `f` under a sync run audit record.
///
/// A `running` row is written before `f` starts and finalized exactly once
/// afterwards: `success` with the counters and the resource's watermark, or
/// `error` with the counters, the watermark as of the failure and the full
/// error chain. The closure's error is always the one returned.
pub fn audit_run<T, F>(store: &SqliteStore, provider: &str, resource: &str, f: F) -> Result<T>
where
    F: FnOnce(&mut SyncRunStats) -> Result<T>,
{
    let run_id = store.start_sync_run(provider, resource)?;
    debug!("[SYNC] Started run {} for {}/{}", run_id, provider, resource);

    let mut stats = SyncRunStats::default();
    let result = f(&mut stats);

    match result {
        Ok(value) => {
            let watermark = current_watermark(store, provider, resource)?;
            store.finish_sync_run(
                run_id,
                &RunFinish {
                    status: RunStatus::Success,
                    stats,
                    watermark_after: watermark.as_deref(),
                    error_text: None,
                },
            )?;
            info!(
                "[SYNC] {}/{} done: {} inserted, {} updated, {} deleted, {} unchanged",
                provider, resource, stats.inserted, stats.updated, stats.deleted, stats.unchanged
            );
            Ok(value)
        }
        Err(err) => {
            let error_text = format!("{:#}", err);
            let finish = current_watermark(store, provider, resource).and_then(|watermark| {
                store.finish_sync_run(
                    run_id,
                    &RunFinish {
                        status: RunStatus::Error,
                        stats,
                        watermark_after: watermark.as_deref(),
                        error_text: Some(&error_text),
                    },
                )
            });
            if let Err(finish_err) = finish {
                error!(
                    "[SYNC] Failed to record error for run {} ({}/{}): {:#}",
                    run_id, provider, resource, finish_err
                );
            }
            error!("[SYNC] {}/{} failed: {}", provider, resource, error_text);
            Err(err)
        }
    }
}

/// Run `f` in a store transaction under a sync run audit record.
///
/// The audit row lives outside the transaction, so a failed run keeps its
/// `error` row while the resource's writes are rolled back.
pub fn sync_run<T, F>(store: &SqliteStore, provider: &str, resource: &str, f: F) -> Result<T>
where
    F: FnOnce(&mut SyncRunStats) -> Result<T>,
{
    audit_run(store, provider, resource, |stats| store.transaction(|| f(stats)))
}

fn current_watermark(
    store: &SqliteStore,
    provider: &str,
    resource: &str,
) -> Result<Option<String>> {
    Ok(store
        .get_sync_state(provider, resource)?
        .and_then(|state| state.watermark))
}

impl SqliteStore {
    /// See [`sync_run`]
    pub fn sync_run<T, F>(&self, provider: &str, resource: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut SyncRunStats) -> Result<T>,
    {
        sync_run(self, provider, resource, f)
    }

    /// See [`audit_run`]
    pub fn audit_run<T, F>(&self, provider: &str, resource: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut SyncRunStats) -> Result<T>,
    {
        audit_run(self, provider, resource, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewRecord, SyncStateUpdate};
    use serde_json::json;
    use tempfile::tempdir;

    fn create_test_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("health.test.sqlite")).unwrap();
        (store, dir)
    }

    #[test]
    fn test_successful_run_is_audited() {
        let (store, _dir) = create_test_store();

        let value = store
            .sync_run("demo", "items", |stats| {
                let payload = json!({"id": "a"});
                let outcome = store.upsert_record(&NewRecord::new("demo", "items", "a", &payload))?;
                stats.add_upsert(outcome);
                store.set_sync_state("demo", "items", &SyncStateUpdate::watermark("2026-02-11"))?;
                Ok(42)
            })
            .unwrap();
        assert_eq!(value, 42);

        let runs = store.recent_sync_runs(1).unwrap();
        assert_eq!(runs[0].status, RunStatus::Success);
        assert_eq!(runs[0].stats.inserted, 1);
        assert_eq!(runs[0].watermark_before, None);
        assert_eq!(runs[0].watermark_after.as_deref(), Some("2026-02-11T00:00:00Z"));
    }

    #[test]
    fn test_failed_run_rolls_back_and_records_error() {
        let (store, _dir) = create_test_store();
        store
            .set_sync_state("demo", "items", &SyncStateUpdate::watermark("2026-02-01"))
            .unwrap();

        let result: Result<()> = store.sync_run("demo", "items", |stats| {
            let payload = json!({"id": "a"});
            stats.add_upsert(store.upsert_record(&NewRecord::new("demo", "items", "a", &payload))?);
            store.set_sync_state("demo", "items", &SyncStateUpdate::watermark("2026-02-11"))?;
            anyhow::bail!("vendor exploded")
        });
        assert_eq!(result.unwrap_err().to_string(), "vendor exploded");

        let run = &store.recent_sync_runs(1).unwrap()[0];
        assert_eq!(run.status, RunStatus::Error);
        assert_eq!(run.stats.inserted, 1);
        assert!(run.error_text.as_deref().unwrap().contains("vendor exploded"));
        assert_eq!(run.watermark_after.as_deref(), Some("2026-02-01T00:00:00Z"));
        assert!(store.get_record("demo", "items", "a").unwrap().is_none());
    }

    #[test]
    fn test_audit_run_without_transaction_keeps_writes() {
        let (store, _dir) = create_test_store();

        let result: Result<()> = store.audit_run("demo", "items", |stats| {
            let payload = json!({"id": "a"});
            stats.add_upsert(store.upsert_record(&NewRecord::new("demo", "items", "a", &payload))?);
            anyhow::bail!("late failure")
        });
        assert!(result.is_err());
        assert!(store.get_record("demo", "items", "a").unwrap().is_some());
        assert_eq!(store.recent_sync_runs(1).unwrap()[0].status, RunStatus::Error);
    }
}
