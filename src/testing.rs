//! Shared fixtures for unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::client::FsClient;
use crate::store::{ByteStore, MemoryStore};
use crate::vfs::{FsError, FsResult, MemoryFs, Stat, Storage};
use crate::worker::Worker;

/// A ready worker on its own thread over an in-memory store.
pub async fn booted_client() -> (FsClient, Arc<MemoryStore>) {
    booted_client_over(MemoryFs::new()).await
}

/// Same as [`booted_client`] with a caller-supplied storage engine.
pub async fn booted_client_over<S: Storage + 'static>(fs: S) -> (FsClient, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let (transport, _handle) = Worker::new(fs, store.clone())
        .spawn()
        .expect("spawn worker");
    transport.wait_ready().await.expect("worker ready");
    (FsClient::new(transport), store)
}

/// In-memory store whose writes start failing once armed.
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryStore,
    broken: AtomicBool,
}

impl FailingStore {
    pub fn break_writes(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

impl ByteStore for FailingStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, bytes: &[u8]) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            bail!("disk full");
        }
        self.inner.set(key, bytes)
    }

    fn clear_all(&self) -> Result<()> {
        self.inner.clear_all()
    }
}

/// `MemoryFs` with injected faults: writes to `fail_once` paths fail the
/// first time only, stats of `hidden` paths always fail.
#[derive(Default)]
pub struct FlakyFs {
    inner: MemoryFs,
    fail_once: HashSet<String>,
    hidden: HashSet<String>,
}

impl FlakyFs {
    pub fn failing_write_once(mut self, path: &str) -> Self {
        self.fail_once.insert(path.to_string());
        self
    }

    pub fn unstatable(mut self, path: &str) -> Self {
        self.hidden.insert(path.to_string());
        self
    }
}

impl Storage for FlakyFs {
    fn mkdir(&mut self, path: &str) -> FsResult<()> {
        self.inner.mkdir(path)
    }

    fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        self.inner.readdir(path)
    }

    fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        self.inner.read_file(path)
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> FsResult<()> {
        if self.fail_once.remove(path) {
            return Err(FsError::NotPermitted(path.to_string()));
        }
        self.inner.write_file(path, data)
    }

    fn stat(&self, path: &str) -> FsResult<Stat> {
        if self.hidden.contains(path) {
            return Err(FsError::NotPermitted(path.to_string()));
        }
        self.inner.stat(path)
    }

    fn rm(&mut self, path: &str) -> FsResult<()> {
        self.inner.rm(path)
    }

    fn rmdir(&mut self, path: &str) -> FsResult<()> {
        self.inner.rmdir(path)
    }

    fn mv(&mut self, from: &str, to: &str) -> FsResult<()> {
        self.inner.mv(from, to)
    }

    fn cp(&mut self, from: &str, to: &str) -> FsResult<()> {
        self.inner.cp(from, to)
    }

    fn snapshot(&self) -> FsResult<Vec<u8>> {
        self.inner.snapshot()
    }

    fn restore(&mut self, bytes: Option<&[u8]>) -> FsResult<()> {
        self.inner.restore(bytes)
    }
}
