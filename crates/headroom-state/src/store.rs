//! HistoryStore — redb-backed audit trail of sizing decisions.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::HISTORY;
use crate::types::AdjustmentRecord;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe history store backed by redb.
#[derive(Clone)]
pub struct HistoryStore {
    db: Arc<Database>,
    /// Per-process sequence keeping same-millisecond keys distinct.
    seq: Arc<AtomicU64>,
}

impl HistoryStore {
    /// Open (or create) a persistent history store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            seq: Arc::new(AtomicU64::new(0)),
        };
        store.ensure_tables()?;
        debug!(?path, "history store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory history store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            seq: Arc::new(AtomicU64::new(0)),
        };
        store.ensure_tables()?;
        debug!("in-memory history store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(HISTORY).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Append one adjustment record.
    pub fn append(&self, record: &AdjustmentRecord) -> StateResult<()> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) % 1_000_000;
        let key = format!("{:020}:{seq:06}", record.unix_ms);
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(HISTORY).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, action = ?record.action, "adjustment recorded");
        Ok(())
    }

    /// The most recent records, newest first.
    pub fn recent(&self, limit: usize) -> StateResult<Vec<AdjustmentRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HISTORY).map_err(map_err!(Table))?;
        let mut all = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: AdjustmentRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            all.push(record);
        }
        let start = all.len().saturating_sub(limit);
        let mut recent = all.split_off(start);
        recent.reverse();
        Ok(recent)
    }

    /// Delete records older than the cutoff. Returns the number deleted.
    pub fn prune_older_than(&self, cutoff_unix_ms: u64) -> StateResult<u64> {
        // Keys are zero-padded, so the bare cutoff prefix sorts below every
        // key from the same millisecond onward (':' > '9').
        let cutoff_key = format!("{cutoff_unix_ms:020}");
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(HISTORY).map_err(map_err!(Table))?;
            table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, _) = entry.ok()?;
                    let k = key.value().to_string();
                    (k.as_str() < cutoff_key.as_str()).then_some(k)
                })
                .collect()
        };

        if keys.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(HISTORY).map_err(map_err!(Table))?;
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(deleted = keys.len(), "old history pruned");
        Ok(keys.len() as u64)
    }

    /// Delete all records. Returns the number deleted.
    pub fn clear(&self) -> StateResult<u64> {
        self.prune_older_than(u64::MAX)
    }
}
