//! Idempotent upsert of vendor items
//!
//! Turns loosely-shaped vendor JSON into keyed, time-annotated records and
//! writes them through the store, accumulating per-run statistics.

use anyhow::Result;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::models::{NewRecord, SyncRunStats, UpsertOutcome};
use crate::storage::SqliteStore;

/// Candidate field names used to key and time-stamp an item.
///
/// Each list is tried in order; the first present, non-empty value wins.
#[derive(Debug, Clone, Default)]
pub struct ItemKeys<'a> {
    pub record_id_keys: &'a [&'a str],
    pub start_keys: &'a [&'a str],
    pub end_keys: &'a [&'a str],
    pub updated_keys: &'a [&'a str],
    /// Prefix for content-hash ids when no id field is present
    pub fallback_prefix: &'a str,
}

impl<'a> ItemKeys<'a> {
    pub fn new(record_id_keys: &'a [&'a str]) -> Self {
        Self {
            record_id_keys,
            fallback_prefix: "sha256",
            ..Default::default()
        }
    }

    pub fn start(mut self, keys: &'a [&'a str]) -> Self {
        self.start_keys = keys;
        self
    }

    pub fn end(mut self, keys: &'a [&'a str]) -> Self {
        self.end_keys = keys;
        self
    }

    pub fn updated(mut self, keys: &'a [&'a str]) -> Self {
        self.updated_keys = keys;
        self
    }

    pub fn fallback_prefix(mut self, prefix: &'a str) -> Self {
        self.fallback_prefix = prefix;
        self
    }
}

/// First candidate field that is present, not null and not an empty string
pub fn first_present<'v>(item: &'v Value, keys: &[&str]) -> Option<&'v Value> {
    keys.iter()
        .filter_map(|key| item.get(*key))
        .find(|value| match value {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        })
}

/// Text form of a JSON value: strings verbatim, everything else as JSON
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Deterministic JSON text for a value.
///
/// Object keys are written in sorted order regardless of how the map was
/// built, so structurally equal values produce identical text. Compact
/// separators; characters outside printable ASCII are `\uXXXX` escaped.
pub fn stable_json(value: &Value) -> String {
    let mut out = String::new();
    write_stable(value, &mut out);
    out
}

fn write_stable(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_ascii_string(key, out);
                out.push(':');
                write_stable(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_stable(item, out);
            }
            out.push(']');
        }
        Value::String(s) => write_ascii_string(s, out),
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_ascii_string(s: &str, out: &mut String) {
    let quoted = Value::String(s.to_owned()).to_string();
    for c in quoted.chars() {
        if c.is_ascii() && c != '\u{7f}' {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units).iter() {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
}

/// Hex SHA-256 of the stable JSON form
pub fn content_hash(value: &Value) -> String {
    let digest = Sha256::digest(stable_json(value).as_bytes());
    hex::encode(digest)
}

/// Record id for an item: the first id field, or `{prefix}:{content hash}`
pub fn record_id_for(item: &Value, keys: &[&str], fallback_prefix: &str) -> String {
    match first_present(item, keys) {
        Some(value) => value_to_text(value),
        None => format!("{}:{}", fallback_prefix, content_hash(item)),
    }
}

/// Upsert one vendor item and fold the outcome into `stats`
pub fn upsert_item(
    store: &SqliteStore,
    stats: &mut SyncRunStats,
    provider: &str,
    resource: &str,
    item: &Value,
    keys: &ItemKeys<'_>,
) -> Result<UpsertOutcome> {
    let record_id = record_id_for(item, keys.record_id_keys, keys.fallback_prefix);
    let start_time = first_present(item, keys.start_keys).map(value_to_text);
    let end_time = first_present(item, keys.end_keys).map(value_to_text);
    let updated_at = first_present(item, keys.updated_keys).map(value_to_text);

    let record = NewRecord::new(provider, resource, &record_id, item)
        .start_time(start_time.as_deref())
        .end_time(end_time.as_deref())
        .source_updated_at(updated_at.as_deref());

    let outcome = store.upsert_record(&record)?;
    stats.add_upsert(outcome);
    Ok(outcome)
}

/// Delete one record and fold the result into `stats`
pub fn delete_item(
    store: &SqliteStore,
    stats: &mut SyncRunStats,
    provider: &str,
    resource: &str,
    record_id: &str,
) -> Result<bool> {
    let deleted = store.delete_record(provider, resource, record_id)?;
    stats.add_delete(deleted);
    Ok(deleted)
}
