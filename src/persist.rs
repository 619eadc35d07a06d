//! Persistence coordinator: snapshot the tree into the byte store.
//!
//! Called by the worker after every successful mutation, before the
//! response leaves, and by bootstrap after seeding or repair. There is no
//! write-ahead log; a crash between the in-memory change and `set` loses
//! that change.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::store::{ByteStore, SNAPSHOT_KEY};
use crate::vfs::Storage;

#[derive(Clone)]
pub struct Persister {
    store: Arc<dyn ByteStore>,
}

impl Persister {
    pub fn new(store: Arc<dyn ByteStore>) -> Self {
        Self { store }
    }

    /// The snapshot written by the previous run, if any.
    pub fn load(&self) -> Result<Option<Vec<u8>>> {
        self.store
            .get(SNAPSHOT_KEY)
            .context("reading persisted snapshot")
    }

    /// Serialize the whole tree and write it under [`SNAPSHOT_KEY`].
    pub fn persist(&self, fs: &dyn Storage) -> Result<()> {
        let bytes = fs.snapshot().context("serializing tree")?;
        self.store
            .set(SNAPSHOT_KEY, &bytes)
            .context("writing snapshot")?;
        debug!(len = bytes.len(), "snapshot persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::vfs::MemoryFs;

    #[test]
    fn persisted_bytes_restore_the_tree() {
        let store = Arc::new(MemoryStore::new());
        let persister = Persister::new(store.clone());
        assert_eq!(persister.load().unwrap(), None);

        let mut fs = MemoryFs::new();
        fs.mkdir("/kept").unwrap();
        persister.persist(&fs).unwrap();
        assert_eq!(store.write_count(), 1);

        let mut reloaded = MemoryFs::new();
        reloaded.restore(persister.load().unwrap().as_deref()).unwrap();
        assert!(reloaded.exists("/kept"));
    }
}
