// 💾 Classification Store - symbol → {type, lastUpdated} that outlives a run
// Loaded once, merged with the built-in table, saved (full overwrite) after every mutation batch

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::symbols::{normalize_symbol, AssetType};

/// Fixed key the whole store is serialized under
pub const DEFAULT_STORAGE_KEY: &str = "investment_symbol_database";

// ============================================================================
// KEY-VALUE BACKENDS
// ============================================================================

/// String-keyed get/set. The store never sees anything richer than this.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// SQLite-backed key-value table
pub struct SqliteKeyValueStore {
    conn: Connection,
}

impl SqliteKeyValueStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open store database: {}", path.as_ref().display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // WAL is unavailable for :memory: databases; sqlite reports "memory" and carries on
        conn.pragma_update(None, "journal_mode", "WAL")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(SqliteKeyValueStore { conn })
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }
}

/// HashMap-backed store for tests and throwaway runs
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: HashMap<String, String>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ============================================================================
// CLASSIFICATION RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolRecord {
    pub symbol: String,

    #[serde(rename = "type")]
    pub asset_type: AssetType,

    /// Security name seen when the user classified the symbol
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated: DateTime<Utc>,
}

impl SymbolRecord {
    pub fn new(symbol: &str, asset_type: AssetType) -> Self {
        SymbolRecord {
            symbol: normalize_symbol(symbol),
            asset_type,
            name: None,
            last_updated: Utc::now(),
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name.filter(|n| !n.trim().is_empty());
        self
    }
}

// ============================================================================
// CLASSIFICATION STORE
// ============================================================================

/// Explicit state value; load/merge/save are plain functions over it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationStore {
    records: BTreeMap<String, SymbolRecord>,
}

impl ClassificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from the backend. Never fails: a missing or corrupt blob yields an empty store.
    pub fn load(backend: &dyn KeyValueStore, key: &str) -> Self {
        let raw = match backend.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key, "No persisted classifications, starting empty");
                return Self::new();
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to read classification store, starting empty");
                return Self::new();
            }
        };

        match serde_json::from_str::<BTreeMap<String, SymbolRecord>>(&raw) {
            Ok(parsed) => {
                // Re-key canonically in case the blob was written by hand
                let records = parsed
                    .into_values()
                    .map(|mut r| {
                        r.symbol = normalize_symbol(&r.symbol);
                        (r.symbol.clone(), r)
                    })
                    .filter(|(symbol, _)| !symbol.is_empty())
                    .collect();
                let store = ClassificationStore { records };
                info!(key, count = store.len(), "Loaded classification store");
                store
            }
            Err(e) => {
                warn!(key, error = %e, "Corrupt classification store, starting empty");
                Self::new()
            }
        }
    }

    /// Serialize the entire store (full overwrite). Best-effort: failures are logged.
    pub fn save(&self, backend: &mut dyn KeyValueStore, key: &str) -> bool {
        let json = match serde_json::to_string(&self.records) {
            Ok(json) => json,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize classification store");
                return false;
            }
        };

        match backend.set(key, &json) {
            Ok(()) => {
                debug!(key, count = self.len(), "Saved classification store");
                true
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to persist classification store");
                false
            }
        }
    }

    /// Seed from a static table. Only inserts absent symbols, so a prior
    /// user override always survives. Returns how many were added.
    pub fn merge(&mut self, table: &[(&str, AssetType)]) -> usize {
        let mut added = 0;

        for (symbol, asset_type) in table {
            let key = normalize_symbol(symbol);
            if key.is_empty() || self.records.contains_key(&key) {
                continue;
            }
            self.records.insert(key.clone(), SymbolRecord::new(&key, *asset_type));
            added += 1;
        }

        added
    }

    /// Record an explicit classification, overwriting whatever was there
    pub fn upsert(&mut self, record: SymbolRecord) {
        if record.symbol.is_empty() {
            return;
        }
        self.records.insert(record.symbol.clone(), record);
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolRecord> {
        self.records.get(&normalize_symbol(symbol))
    }

    pub fn records(&self) -> impl Iterator<Item = &SymbolRecord> {
        self.records.values()
    }

    /// Flat symbol → type view for the session mapping
    pub fn mappings(&self) -> HashMap<String, AssetType> {
        self.records
            .iter()
            .map(|(symbol, record)| (symbol.clone(), record.asset_type))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
