//! SQLite-backed durable store for records, sync state, credentials and
//! the sync run audit log

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};
use serde_json::Value;

use crate::models::{
    Credential, NewRecord, Record, RecordCount, RunFinish, RunStatus, SyncRun, SyncRunStats,
    SyncState, SyncStateUpdate, TokenSet, UpsertOutcome,
};
use crate::upsert::stable_json;
use crate::watermark::{normalize, utc_now_canonical};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- Cached vendor records
            CREATE TABLE records (
                provider TEXT NOT NULL,
                resource TEXT NOT NULL,
                record_id TEXT NOT NULL,
                start_time TEXT,
                end_time TEXT,
                source_updated_at TEXT,
                payload_json TEXT NOT NULL,
                fetched_at TEXT NOT NULL,
                PRIMARY KEY (provider, resource, record_id)
            );

            CREATE INDEX idx_records_start
                ON records(provider, resource, start_time);
            CREATE INDEX idx_records_updated
                ON records(provider, resource, source_updated_at);

            -- Progress per (provider, resource)
            CREATE TABLE sync_state (
                provider TEXT NOT NULL,
                resource TEXT NOT NULL,
                watermark TEXT,
                cursor TEXT,
                extra_json TEXT,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (provider, resource)
            );

            -- One bearer credential per provider
            CREATE TABLE credentials (
                provider TEXT PRIMARY KEY,
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                token_type TEXT,
                scope TEXT,
                expires_at TEXT,
                obtained_at TEXT NOT NULL,
                extra_json TEXT
            );
            "#,
        ),
        // Migration 2: Sync run audit log
        M::up(
            r#"
            CREATE TABLE sync_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                provider TEXT NOT NULL,
                resource TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                watermark_before TEXT,
                watermark_after TEXT,
                inserted_count INTEGER NOT NULL DEFAULT 0,
                updated_count INTEGER NOT NULL DEFAULT 0,
                deleted_count INTEGER NOT NULL DEFAULT 0,
                unchanged_count INTEGER NOT NULL DEFAULT 0,
                error_text TEXT
            );

            CREATE INDEX idx_sync_runs_resource
                ON sync_runs(provider, resource, id DESC);
            "#,
        ),
    ])
}

const RECORD_COLUMNS: &str = "provider, resource, record_id, start_time, end_time, \
                              source_updated_at, payload_json, fetched_at";

const SYNC_RUN_COLUMNS: &str = "id, provider, resource, status, started_at, finished_at, \
                                watermark_before, watermark_after, inserted_count, \
                                updated_count, deleted_count, unchanged_count, error_text";

/// SQLite-based store
///
/// The store is the only component that touches the on-disk representation.
/// Writes outside a [`SqliteStore::transaction`] scope autocommit.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    /// Number of open savepoints
    depth: AtomicUsize,
}

impl SqliteStore {
    /// Open (creating if needed) the store at `db_path` and initialize the schema
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL keeps repeated incremental syncs fast; NORMAL sync is safe with WAL.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        let store = Self {
            conn: Mutex::new(conn),
            depth: AtomicUsize::new(0),
        };
        store.init()?;
        Ok(store)
    }

    /// Create missing tables and normalize legacy timestamp values.
    ///
    /// Safe to call repeatedly.
    pub fn init(&self) -> Result<()> {
        {
            let mut conn = self.conn()?;
            migrations()
                .to_latest(&mut *conn)
                .context("Failed to run database migrations")?;
        }

        match self.normalize_existing_timestamps() {
            Ok(0) => {}
            Ok(n) => debug!("[STORE] Normalized {} stored timestamp values", n),
            Err(e) => warn!("[STORE] Timestamp normalization pass failed: {:#}", e),
        }
        Ok(())
    }

    /// Close the underlying connection
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| anyhow!("Database connection lock poisoned"))?;
        conn.close()
            .map_err(|(_, e)| e)
            .context("Failed to close database")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }

    /// Rewrite non-canonical watermarks and expiry values already on disk
    fn normalize_existing_timestamps(&self) -> Result<usize> {
        let conn = self.conn()?;
        let mut changed = 0;

        let watermarks: Vec<(String, String, String)> = conn
            .prepare(
                "SELECT provider, resource, watermark FROM sync_state WHERE watermark IS NOT NULL",
            )?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        for (provider, resource, watermark) in watermarks {
            let normalized = normalize(watermark.as_str());
            if normalized != watermark {
                conn.execute(
                    "UPDATE sync_state SET watermark = ? WHERE provider = ? AND resource = ?",
                    params![normalized, provider, resource],
                )?;
                changed += 1;
            }
        }

        let expiries: Vec<(String, String)> = conn
            .prepare("SELECT provider, expires_at FROM credentials WHERE expires_at IS NOT NULL")?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        for (provider, expires_at) in expiries {
            let normalized = normalize(expires_at.as_str());
            if normalized != expires_at {
                conn.execute(
                    "UPDATE credentials SET expires_at = ? WHERE provider = ?",
                    params![normalized, provider],
                )?;
                changed += 1;
            }
        }

        Ok(changed)
    }

    // === Transactions ===

    /// Run `f` inside a transaction boundary.
    ///
    /// Each scope is a savepoint, so scopes nest: the outermost one begins
    /// the transaction and commits it on release. When `f` fails or panics,
    /// writes made since this boundary are rolled back.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let savepoint = self.begin_savepoint()?;
        let value = f()?;
        savepoint.release()?;
        Ok(value)
    }

    fn begin_savepoint(&self) -> Result<Savepoint<'_>> {
        let depth = self.depth.load(Ordering::SeqCst);
        let name = format!("health_sync_sp_{}", depth);

        self.conn()?
            .execute_batch(&format!("SAVEPOINT {}", name))
            .with_context(|| format!("Failed to open savepoint {}", name))?;
        self.depth.fetch_add(1, Ordering::SeqCst);

        Ok(Savepoint {
            store: self,
            name,
            released: false,
        })
    }

    /// Whether a transaction scope is currently open
    pub fn in_transaction(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }

    fn release_savepoint(&self, name: &str) -> Result<()> {
        self.conn()?
            .execute_batch(&format!("RELEASE SAVEPOINT {}", name))
            .with_context(|| format!("Failed to release savepoint {}", name))
    }

    fn rollback_savepoint(&self, name: &str) -> Result<()> {
        self.conn()?
            .execute_batch(&format!(
                "ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name};"
            ))
            .with_context(|| format!("Failed to roll back savepoint {}", name))
    }

    // === Records ===

    /// Insert or overwrite a record, classifying the change.
    ///
    /// The write always happens so `fetched_at` is refreshed; the outcome
    /// reflects whether the payload or time fields differ from what was stored.
    pub fn upsert_record(&self, record: &NewRecord<'_>) -> Result<UpsertOutcome> {
        let payload_json = stable_json(record.payload);
        let fetched_at = record
            .fetched_at
            .map(str::to_string)
            .unwrap_or_else(utc_now_canonical);

        let conn = self.conn()?;

        let existing: Option<(Option<String>, Option<String>, Option<String>, String)> = conn
            .query_row(
                "SELECT start_time, end_time, source_updated_at, payload_json
                 FROM records WHERE provider = ? AND resource = ? AND record_id = ?",
                params![record.provider, record.resource, record.record_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let outcome = match existing {
            None => UpsertOutcome::Inserted,
            Some((start_time, end_time, source_updated_at, stored_payload))
                if start_time.as_deref() == record.start_time
                    && end_time.as_deref() == record.end_time
                    && source_updated_at.as_deref() == record.source_updated_at
                    && stored_payload == payload_json =>
            {
                UpsertOutcome::Unchanged
            }
            Some(_) => UpsertOutcome::Updated,
        };

        conn.execute(
            "INSERT INTO records
             (provider, resource, record_id, start_time, end_time, source_updated_at,
              payload_json, fetched_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(provider, resource, record_id) DO UPDATE SET
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                source_updated_at = excluded.source_updated_at,
                payload_json = excluded.payload_json,
                fetched_at = excluded.fetched_at",
            params![
                record.provider,
                record.resource,
                record.record_id,
                record.start_time,
                record.end_time,
                record.source_updated_at,
                payload_json,
                fetched_at,
            ],
        )
        .with_context(|| {
            format!(
                "Failed to upsert record {}/{}/{}",
                record.provider, record.resource, record.record_id
            )
        })?;

        Ok(outcome)
    }

    /// Delete a record; returns true iff a row existed
    pub fn delete_record(&self, provider: &str, resource: &str, record_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM records WHERE provider = ? AND resource = ? AND record_id = ?",
            params![provider, resource, record_id],
        )?;
        Ok(deleted > 0)
    }

    /// Get a record by key
    pub fn get_record(
        &self,
        provider: &str,
        resource: &str,
        record_id: &str,
    ) -> Result<Option<Record>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM records WHERE provider = ? AND resource = ? AND record_id = ?",
                    RECORD_COLUMNS
                ),
                params![provider, resource, record_id],
                raw_record,
            )
            .optional()?;

        raw.map(RawRecord::into_record).transpose()
    }

    /// List records for a resource ordered by `start_time`.
    ///
    /// Bounds are inclusive and compared as strings, which orders correctly
    /// for canonical timestamps and `YYYY-MM-DD` dates.
    pub fn list_records(
        &self,
        provider: &str,
        resource: &str,
        since: Option<&str>,
        until: Option<&str>,
    ) -> Result<Vec<Record>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM records
             WHERE provider = ?1 AND resource = ?2
               AND (?3 IS NULL OR start_time >= ?3)
               AND (?4 IS NULL OR start_time <= ?4)
             ORDER BY start_time ASC, record_id ASC",
            RECORD_COLUMNS
        ))?;

        let raws = stmt
            .query_map(params![provider, resource, since, until], raw_record)?
            .collect::<Result<Vec<_>, _>>()?;

        raws.into_iter().map(RawRecord::into_record).collect()
    }

    /// Latest `start_time` stored for a resource
    pub fn get_max_start_time(&self, provider: &str, resource: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let max: Option<String> = conn.query_row(
            "SELECT MAX(start_time) FROM records WHERE provider = ? AND resource = ?",
            params![provider, resource],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    /// Count records per `(provider, resource)`
    pub fn record_counts(&self) -> Result<Vec<RecordCount>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT provider, resource, COUNT(*) FROM records
             GROUP BY provider, resource
             ORDER BY provider, resource",
        )?;

        let counts = stmt
            .query_map([], |row| {
                Ok(RecordCount {
                    provider: row.get(0)?,
                    resource: row.get(1)?,
                    count: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(counts)
    }

    // === Sync state ===

    /// Get sync state for a resource
    pub fn get_sync_state(&self, provider: &str, resource: &str) -> Result<Option<SyncState>> {
        let conn = self.conn()?;
        load_sync_state(&conn, provider, resource)
    }

    /// Save sync state (upsert), normalizing the watermark
    pub fn set_sync_state(
        &self,
        provider: &str,
        resource: &str,
        update: &SyncStateUpdate<'_>,
    ) -> Result<()> {
        let watermark = update.watermark.map(normalize);
        let extra_json = update
            .extra
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize sync state metadata")?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_state (provider, resource, watermark, cursor, extra_json, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(provider, resource) DO UPDATE SET
                watermark = excluded.watermark,
                cursor = excluded.cursor,
                extra_json = excluded.extra_json,
                updated_at = excluded.updated_at",
            params![
                provider,
                resource,
                watermark,
                update.cursor,
                extra_json,
                utc_now_canonical(),
            ],
        )
        .with_context(|| format!("Failed to save sync state {}/{}", provider, resource))?;

        Ok(())
    }

    /// All sync states ordered by provider and resource
    pub fn list_sync_states(&self) -> Result<Vec<SyncState>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT provider, resource, watermark, cursor, extra_json, updated_at
             FROM sync_state ORDER BY provider, resource",
        )?;

        let rows = stmt
            .query_map([], raw_sync_state)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows.into_iter().map(RawSyncState::into_state).collect())
    }

    // === Credentials ===

    /// Get the stored credential for a provider
    pub fn get_credential(&self, provider: &str) -> Result<Option<Credential>> {
        let conn = self.conn()?;

        let row: Option<(
            String,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
            String,
            Option<String>,
        )> = conn
            .query_row(
                "SELECT provider, access_token, refresh_token, token_type, scope,
                        expires_at, obtained_at, extra_json
                 FROM credentials WHERE provider = ?",
                [provider],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            provider,
            access_token,
            refresh_token,
            token_type,
            scope,
            expires_at,
            obtained_at,
            extra_json,
        )) = row
        else {
            return Ok(None);
        };

        let extra = parse_extra(extra_json, || format!("credentials {}", provider));

        Ok(Some(Credential {
            provider,
            access_token,
            refresh_token,
            token_type,
            scope,
            expires_at,
            obtained_at,
            extra,
        }))
    }

    /// Save the credential for a provider (last write wins), normalizing `expires_at`
    pub fn set_credential(&self, provider: &str, tokens: &TokenSet) -> Result<()> {
        let expires_at = tokens.expires_at.as_deref().map(normalize);
        let extra_json = tokens
            .extra
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize credential metadata")?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO credentials
             (provider, access_token, refresh_token, token_type, scope, expires_at,
              obtained_at, extra_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(provider) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_type = excluded.token_type,
                scope = excluded.scope,
                expires_at = excluded.expires_at,
                obtained_at = excluded.obtained_at,
                extra_json = excluded.extra_json",
            params![
                provider,
                tokens.access_token,
                tokens.refresh_token,
                tokens.token_type,
                tokens.scope,
                expires_at,
                utc_now_canonical(),
                extra_json,
            ],
        )
        .with_context(|| format!("Failed to save credential for {}", provider))?;

        Ok(())
    }

    // === Sync runs ===

    /// Record the start of a sync attempt, capturing the current watermark
    pub fn start_sync_run(&self, provider: &str, resource: &str) -> Result<i64> {
        let conn = self.conn()?;
        let watermark_before =
            load_sync_state(&conn, provider, resource)?.and_then(|state| state.watermark);

        conn.execute(
            "INSERT INTO sync_runs (provider, resource, status, started_at, watermark_before)
             VALUES (?, ?, ?, ?, ?)",
            params![
                provider,
                resource,
                RunStatus::Running.as_str(),
                utc_now_canonical(),
                watermark_before,
            ],
        )
        .with_context(|| format!("Failed to start sync run for {}/{}", provider, resource))?;

        Ok(conn.last_insert_rowid())
    }

    /// Finalize a running sync attempt. Each run can be finalized once.
    pub fn finish_sync_run(&self, run_id: i64, finish: &RunFinish<'_>) -> Result<()> {
        if !finish.status.is_terminal() {
            anyhow::bail!("Sync run {} cannot finish with status {}", run_id, finish.status);
        }

        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE sync_runs SET
                status = ?,
                finished_at = ?,
                watermark_after = ?,
                inserted_count = ?,
                updated_count = ?,
                deleted_count = ?,
                unchanged_count = ?,
                error_text = ?
             WHERE id = ? AND status = ?",
            params![
                finish.status.as_str(),
                utc_now_canonical(),
                finish.watermark_after,
                finish.stats.inserted as i64,
                finish.stats.updated as i64,
                finish.stats.deleted as i64,
                finish.stats.unchanged as i64,
                finish.error_text,
                run_id,
                RunStatus::Running.as_str(),
            ],
        )?;

        if updated == 0 {
            anyhow::bail!("Sync run {} does not exist or is already finished", run_id);
        }
        Ok(())
    }

    /// Get a sync run by id
    pub fn get_sync_run(&self, run_id: i64) -> Result<Option<SyncRun>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM sync_runs WHERE id = ?", SYNC_RUN_COLUMNS),
                [run_id],
                raw_sync_run,
            )
            .optional()?;

        raw.map(RawSyncRun::into_run).transpose()
    }

    /// Most recent sync runs, newest first
    pub fn recent_sync_runs(&self, limit: usize) -> Result<Vec<SyncRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sync_runs ORDER BY id DESC LIMIT ?",
            SYNC_RUN_COLUMNS
        ))?;

        let raws = stmt
            .query_map([limit as i64], raw_sync_run)?
            .collect::<Result<Vec<_>, _>>()?;

        raws.into_iter().map(RawSyncRun::into_run).collect()
    }
}

/// Parse a JSON metadata column, treating malformed content as absent
fn parse_extra(raw: Option<String>, what: impl FnOnce() -> String) -> Option<Value> {
    let raw = raw?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("[STORE] Invalid JSON in {}: {}", what(), e);
            None
        }
    }
}

fn load_sync_state(conn: &Connection, provider: &str, resource: &str) -> Result<Option<SyncState>> {
    let raw = conn
        .query_row(
            "SELECT provider, resource, watermark, cursor, extra_json, updated_at
             FROM sync_state WHERE provider = ? AND resource = ?",
            params![provider, resource],
            raw_sync_state,
        )
        .optional()?;

    Ok(raw.map(RawSyncState::into_state))
}

struct RawRecord {
    provider: String,
    resource: String,
    record_id: String,
    start_time: Option<String>,
    end_time: Option<String>,
    source_updated_at: Option<String>,
    payload_json: String,
    fetched_at: String,
}

fn raw_record(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        provider: row.get(0)?,
        resource: row.get(1)?,
        record_id: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        source_updated_at: row.get(5)?,
        payload_json: row.get(6)?,
        fetched_at: row.get(7)?,
    })
}

impl RawRecord {
    fn into_record(self) -> Result<Record> {
        let payload = serde_json::from_str(&self.payload_json).with_context(|| {
            format!(
                "Stored payload for {}/{}/{} is not valid JSON",
                self.provider, self.resource, self.record_id
            )
        })?;

        Ok(Record {
            provider: self.provider,
            resource: self.resource,
            record_id: self.record_id,
            start_time: self.start_time,
            end_time: self.end_time,
            source_updated_at: self.source_updated_at,
            payload,
            fetched_at: self.fetched_at,
        })
    }
}

struct RawSyncState {
    provider: String,
    resource: String,
    watermark: Option<String>,
    cursor: Option<String>,
    extra_json: Option<String>,
    updated_at: String,
}

fn raw_sync_state(row: &Row<'_>) -> rusqlite::Result<RawSyncState> {
    Ok(RawSyncState {
        provider: row.get(0)?,
        resource: row.get(1)?,
        watermark: row.get(2)?,
        cursor: row.get(3)?,
        extra_json: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

impl RawSyncState {
    fn into_state(self) -> SyncState {
        let extra = parse_extra(self.extra_json, || {
            format!("sync_state {}/{}", self.provider, self.resource)
        });

        SyncState {
            provider: self.provider,
            resource: self.resource,
            watermark: self.watermark,
            cursor: self.cursor,
            extra,
            updated_at: self.updated_at,
        }
    }
}

struct RawSyncRun {
    id: i64,
    provider: String,
    resource: String,
    status: String,
    started_at: String,
    finished_at: Option<String>,
    watermark_before: Option<String>,
    watermark_after: Option<String>,
    counts: [i64; 4],
    error_text: Option<String>,
}

fn raw_sync_run(row: &Row<'_>) -> rusqlite::Result<RawSyncRun> {
    Ok(RawSyncRun {
        id: row.get(0)?,
        provider: row.get(1)?,
        resource: row.get(2)?,
        status: row.get(3)?,
        started_at: row.get(4)?,
        finished_at: row.get(5)?,
        watermark_before: row.get(6)?,
        watermark_after: row.get(7)?,
        counts: [row.get(8)?, row.get(9)?, row.get(10)?, row.get(11)?],
        error_text: row.get(12)?,
    })
}

impl RawSyncRun {
    fn into_run(self) -> Result<SyncRun> {
        let [inserted, updated, deleted, unchanged] = self.counts;
        Ok(SyncRun {
            id: self.id,
            provider: self.provider,
            resource: self.resource,
            status: self.status.parse()?,
            started_at: self.started_at,
            finished_at: self.finished_at,
            watermark_before: self.watermark_before,
            watermark_after: self.watermark_after,
            stats: SyncRunStats {
                inserted: inserted as u64,
                updated: updated as u64,
                deleted: deleted as u64,
                unchanged: unchanged as u64,
            },
            error_text: self.error_text,
        })
    }
}

/// An open savepoint scope. Dropping it without [`Savepoint::release`]
/// rolls the scope back, including while unwinding.
struct Savepoint<'a> {
    store: &'a SqliteStore,
    name: String,
    released: bool,
}

impl Savepoint<'_> {
    fn release(mut self) -> Result<()> {
        self.store.release_savepoint(&self.name)?;
        self.released = true;
        Ok(())
    }
}

impl Drop for Savepoint<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.store.rollback_savepoint(&self.name) {
                warn!("[STORE] Rollback of {} failed: {:#}", self.name, e);
            }
        }
        self.store.depth.fetch_sub(1, Ordering::SeqCst);
    }
}
