//! Durable byte store: key → blob persistence that survives restarts.
//!
//! `RedbStore` is the on-disk store; `MemoryStore` backs `--ephemeral`
//! sessions and tests, and counts writes.

use anyhow::{Context, Result};
use redb::{Database, TableDefinition};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, instrument};

/// The one key the filesystem snapshot lives under.
pub const SNAPSHOT_KEY: &str = "termfs.snapshot";

pub trait ByteStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, bytes: &[u8]) -> Result<()>;
    /// Remove every key.
    fn clear_all(&self) -> Result<()>;
}

// ── Table definitions ─────────────────────────────────────────────────

/// key (utf-8) → blob
const KV: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

// ── RedbStore ─────────────────────────────────────────────────────────

pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the database at `dir/termfs.redb`.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating data dir {}", dir.display()))?;
        let db_path = dir.join("termfs.redb");
        let db = Database::create(&db_path)
            .with_context(|| format!("opening database {}", db_path.display()))?;

        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(KV)?;
        }
        txn.commit()?;

        info!(path = %db_path.display(), "byte store opened");
        Ok(Self { db })
    }
}

impl ByteStore for RedbStore {
    #[instrument(skip(self))]
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(KV)?;
        Ok(table.get(key)?.map(|v| v.value().to_vec()))
    }

    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    fn set(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(KV)?;
            table.insert(key, bytes)?;
        }
        txn.commit()?;
        debug!(key, "blob stored");
        Ok(())
    }

    #[instrument(skip(self))]
    fn clear_all(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        txn.delete_table(KV)?;
        {
            let _ = txn.open_table(KV)?;
        }
        txn.commit()?;
        info!("byte store cleared");
        Ok(())
    }
}

// ── MemoryStore ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn blobs(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.blobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ByteStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs().get(key).cloned())
    }

    fn set(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs().insert(key.to_string(), bytes.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear_all(&self) -> Result<()> {
        self.blobs().clear();
        Ok(())
    }
}
