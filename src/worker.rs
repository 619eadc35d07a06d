//! The storage-hosting context.
//!
//! A `Worker` owns the tree and the persister. It boots once, announces
//! `ready` or `fatal`, then serves envelopes strictly one at a time in
//! arrival order. A mutation's snapshot write finishes before its response
//! is produced.

use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::bootstrap::Bootstrap;
use crate::persist::Persister;
use crate::protocol::{Envelope, Outbound, RemoteError, Reply, Request, Response, Signal};
use crate::store::ByteStore;
use crate::transport::Transport;
use crate::vfs::Storage;

pub struct Worker<S: Storage> {
    fs: S,
    persister: Persister,
    ready: bool,
}

impl<S: Storage> Worker<S> {
    pub fn new(fs: S, store: Arc<dyn ByteStore>) -> Self {
        Self {
            fs,
            persister: Persister::new(store),
            ready: false,
        }
    }

    /// Run bootstrap and produce the lifecycle signal to announce.
    pub fn boot(&mut self) -> Signal {
        let mut boot = Bootstrap::new(&mut self.fs, &self.persister);
        match boot.run() {
            Ok(report) => {
                info!(
                    restored = report.restored,
                    seed_failures = report.seed_failures,
                    repaired = report.repaired.len(),
                    "storage ready"
                );
                self.ready = true;
                Signal::Ready
            }
            Err(err) => {
                error!(error = %format!("{err:#}"), "bootstrap failed");
                let RemoteError { message, trace } = RemoteError::from_anyhow(&err);
                Signal::Fatal { message, trace }
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Serve one envelope.
    pub fn handle(&mut self, envelope: Envelope) -> Response {
        let Envelope { id, request } = envelope;
        debug!(id, tag = request.tag(), "received request");

        if !self.ready {
            return Response::failure(id, RemoteError::new("storage is not ready"));
        }

        let response = match self.execute(request) {
            Ok(reply) => Response::success(id, reply),
            Err(err) => Response::failure(id, err),
        };
        debug!(id, ok = response.is_ok(), "sending response");
        response
    }

    fn execute(&mut self, request: Request) -> Result<Reply, RemoteError> {
        let mutating = request.is_mutating();
        let fs = &mut self.fs;

        let outcome = match request {
            Request::Hello => Ok(Reply::Hello {
                version: env!("CARGO_PKG_VERSION").to_string(),
            }),
            Request::FsMkdir { path } => fs.mkdir(&path).map(|()| Reply::Unit),
            Request::FsReaddir { path } => fs.readdir(&path).map(|names| Reply::Names { names }),
            Request::FsWriteFile { path, data } => {
                fs.write_file(&path, &data).map(|()| Reply::Unit)
            }
            Request::FsReadFile { path } => fs.read_file(&path).map(|data| Reply::Bytes { data }),
            Request::FsStat { path } => fs.stat(&path).map(|stat| Reply::Stat { stat }),
            Request::FsRm { path } => fs.rm(&path).map(|()| Reply::Unit),
            Request::FsRmdir { path } => fs.rmdir(&path).map(|()| Reply::Unit),
            Request::FsMv { from, to } => fs.mv(&from, &to).map(|()| Reply::Unit),
            Request::FsCp { from, to } => fs.cp(&from, &to).map(|()| Reply::Unit),
        };
        let reply = outcome.map_err(|e| RemoteError::new(e.to_string()))?;

        if mutating {
            self.persister
                .persist(&self.fs)
                .map_err(|e| RemoteError::from_anyhow(&e))?;
        }
        Ok(reply)
    }

    /// Boot, announce, then drain `inbox` until every sender is gone.
    fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Envelope>, outbox: mpsc::UnboundedSender<Outbound>) {
        let signal = self.boot();
        if outbox.send(Outbound::Signal(signal)).is_err() {
            return;
        }
        while let Some(envelope) = inbox.blocking_recv() {
            let response = self.handle(envelope);
            if outbox.send(Outbound::Response(response)).is_err() {
                break;
            }
        }
        info!("storage worker shutting down");
    }
}

impl<S: Storage + 'static> Worker<S> {
    /// Move the worker onto its own thread and return the caller-side
    /// transport. Must be called inside a tokio runtime.
    pub fn spawn(self) -> Result<(Transport, WorkerHandle)> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let thread = thread::Builder::new()
            .name("termfs-storage".to_string())
            .spawn(move || self.run(request_rx, outbound_tx))
            .context("spawning storage worker thread")?;

        let transport = Transport::new(request_tx, outbound_rx);
        Ok((transport, WorkerHandle { thread }))
    }
}

/// Join handle for a spawned worker. The thread exits once every
/// `Transport` clone has been dropped.
pub struct WorkerHandle {
    thread: thread::JoinHandle<()>,
}

impl WorkerHandle {
    pub fn join(self) -> Result<()> {
        self.thread
            .join()
            .map_err(|_| anyhow::anyhow!("storage worker panicked"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, SNAPSHOT_KEY};
    use crate::testing::FailingStore;
    use crate::transport::TransportError;
    use crate::vfs::MemoryFs;

    fn booted() -> (Worker<MemoryFs>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let mut worker = Worker::new(MemoryFs::new(), store.clone());
        assert_eq!(worker.boot(), Signal::Ready);
        (worker, store)
    }

    fn send(worker: &mut Worker<MemoryFs>, id: u64, request: Request) -> Result<Reply, RemoteError> {
        let response = worker.handle(Envelope { id, request });
        assert_eq!(response.id(), id);
        response.into_result()
    }

    fn persisted_tree(store: &MemoryStore) -> MemoryFs {
        let mut fs = MemoryFs::new();
        fs.restore(store.get(SNAPSHOT_KEY).unwrap().as_deref()).unwrap();
        fs
    }

    #[test]
    fn refuses_requests_before_boot() {
        let store = Arc::new(MemoryStore::new());
        let mut worker = Worker::new(MemoryFs::new(), store);
        let err = send(&mut worker, 1, Request::Hello).unwrap_err();
        assert_eq!(err.message, "storage is not ready");
    }

    #[test]
    fn every_mutation_is_persisted_before_reply() {
        let (mut w, store) = booted();
        let p = |s: &str| s.to_string();

        send(&mut w, 1, Request::FsMkdir { path: p("/docs") }).unwrap();
        assert!(persisted_tree(&store).exists("/docs"));

        send(&mut w, 2, Request::FsWriteFile { path: p("/docs/a"), data: b"hi".to_vec() }).unwrap();
        assert_eq!(persisted_tree(&store).read_file("/docs/a").unwrap(), b"hi");

        send(&mut w, 3, Request::FsCp { from: p("/docs/a"), to: p("/docs/b") }).unwrap();
        assert!(persisted_tree(&store).exists("/docs/b"));

        send(&mut w, 4, Request::FsMv { from: p("/docs/b"), to: p("/docs/c") }).unwrap();
        let tree = persisted_tree(&store);
        assert!(tree.exists("/docs/c") && !tree.exists("/docs/b"));

        send(&mut w, 5, Request::FsRm { path: p("/docs/c") }).unwrap();
        assert!(!persisted_tree(&store).exists("/docs/c"));

        send(&mut w, 6, Request::FsMkdir { path: p("/empty") }).unwrap();
        send(&mut w, 7, Request::FsRmdir { path: p("/empty") }).unwrap();
        assert!(!persisted_tree(&store).exists("/empty"));
    }

    #[test]
    fn reads_never_write() {
        let (mut w, store) = booted();
        let before = store.write_count();
        let p = |s: &str| s.to_string();

        send(&mut w, 1, Request::Hello).unwrap();
        send(&mut w, 2, Request::FsReaddir { path: p("/") }).unwrap();
        send(&mut w, 3, Request::FsStat { path: p("/home") }).unwrap();
        send(&mut w, 4, Request::FsReadFile { path: p(crate::bootstrap::CONFIG_PATH) }).unwrap();
        let _ = send(&mut w, 5, Request::FsStat { path: p("/missing") });

        assert_eq!(store.write_count(), before);
    }

    #[test]
    fn failed_mutation_reports_message_and_skips_persist() {
        let (mut w, store) = booted();
        let before = store.write_count();
        let err = send(&mut w, 9, Request::FsRm { path: "/nope".into() }).unwrap_err();
        assert_eq!(err.message, "no such file or directory: /nope");
        assert_eq!(store.write_count(), before);
    }

    #[tokio::test]
    async fn spawned_worker_serves_over_transport() {
        let store = Arc::new(MemoryStore::new());
        let (transport, handle) = Worker::new(MemoryFs::new(), store).spawn().unwrap();
        transport.wait_ready().await.unwrap();

        let reply = transport.call(Request::Hello).await.unwrap();
        assert!(matches!(reply, Reply::Hello { .. }));

        drop(transport);
        tokio::task::spawn_blocking(move || handle.join()).await.unwrap().unwrap();
    }

    #[test]
    fn persist_failure_fails_the_mutation_with_store_cause() {
        let store = Arc::new(FailingStore::default());
        let mut w = Worker::new(MemoryFs::new(), store.clone());
        assert_eq!(w.boot(), Signal::Ready);

        store.break_writes();
        let response = w.handle(Envelope {
            id: 1,
            request: Request::FsMkdir { path: "/x".into() },
        });
        let err = response.into_result().unwrap_err();
        assert_eq!(err.message, "writing snapshot: disk full");

        // The tree keeps the change; only durability was lost.
        let stat = w.handle(Envelope {
            id: 2,
            request: Request::FsStat { path: "/x".into() },
        });
        assert!(stat.is_ok());
    }

    #[test]
    fn corrupt_snapshot_boots_fatal_and_refuses_requests() {
        let store = Arc::new(MemoryStore::new());
        store.set(SNAPSHOT_KEY, b"garbage").unwrap();
        let mut w = Worker::new(MemoryFs::new(), store.clone());

        let Signal::Fatal { message, trace } = w.boot() else {
            panic!("expected a fatal signal");
        };
        assert_eq!(
            message,
            "restoring persisted snapshot: corrupt snapshot: truncated header"
        );
        assert!(trace.is_some());
        assert!(!w.is_ready());

        let err = send(&mut w, 1, Request::Hello).unwrap_err();
        assert_eq!(err.message, "storage is not ready");
        assert_eq!(store.get(SNAPSHOT_KEY).unwrap().as_deref(), Some(&b"garbage"[..]));
    }

    #[tokio::test]
    async fn fatal_boot_surfaces_root_cause_to_callers() {
        let store = Arc::new(MemoryStore::new());
        store.set(SNAPSHOT_KEY, b"garbage").unwrap();
        let (transport, handle) = Worker::new(MemoryFs::new(), store).spawn().unwrap();

        let err = transport.wait_ready().await.unwrap_err();
        assert!(err.to_string().contains("corrupt snapshot"), "{err}");
        let err = transport.call(Request::Hello).await.unwrap_err();
        assert!(matches!(err, TransportError::Fatal { .. }));

        drop(transport);
        tokio::task::spawn_blocking(move || handle.join()).await.unwrap().unwrap();
    }
}
