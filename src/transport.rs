//! Caller side of the worker channel.
//!
//! The channel itself is fire-and-forget in both directions. `Transport`
//! turns it into awaitable calls: each outgoing envelope parks a oneshot
//! sender in the pending table under its id, and a pump task completes the
//! matching entry when a response with that id arrives. Entries are
//! removed on first completion, so duplicates and unknown ids fall through
//! and are dropped.
//!
//! There is no timeout. A call stays pending until its response arrives or
//! the worker side goes away.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::protocol::{Envelope, Outbound, RemoteError, Reply, Request, RequestId, Response, Signal};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The worker has not announced `ready` yet. Nothing was sent.
    #[error("storage is not ready")]
    NotReady,

    /// Bootstrap failed; the worker will never become ready.
    #[error("storage failed to start: {message}")]
    Fatal {
        message: String,
        trace: Option<String>,
    },

    /// Business error reported by the storage engine.
    #[error("{message}")]
    Remote {
        message: String,
        trace: Option<String>,
    },

    #[error("request id {0} is already in flight")]
    DuplicateId(RequestId),

    #[error("unexpected {got} reply to {request}")]
    UnexpectedReply {
        request: &'static str,
        got: &'static str,
    },

    #[error("storage worker disconnected")]
    Disconnected,
}

impl From<RemoteError> for TransportError {
    fn from(err: RemoteError) -> Self {
        TransportError::Remote {
            message: err.message,
            trace: err.trace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Readiness {
    Starting,
    Ready,
    Failed(RemoteError),
}

type Pending = HashMap<RequestId, oneshot::Sender<Response>>;

struct Shared {
    pending: Mutex<Pending>,
    next_id: AtomicU64,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Complete the caller waiting on `response.id()`, if any.
    fn resolve(&self, response: Response) {
        let id = response.id();
        let Some(waiter) = self.pending().remove(&id) else {
            debug!(id, "discarding response for unknown or settled id");
            return;
        };
        if waiter.send(response).is_err() {
            debug!(id, "caller stopped waiting before its response arrived");
        }
    }
}

/// Cloneable handle; every clone shares one pending table.
#[derive(Clone)]
pub struct Transport {
    outbox: mpsc::UnboundedSender<Envelope>,
    shared: Arc<Shared>,
    readiness: watch::Receiver<Readiness>,
}

impl Transport {
    /// Wire a transport to a worker's channels and start the inbound pump.
    /// Must be called inside a tokio runtime.
    pub fn new(
        outbox: mpsc::UnboundedSender<Envelope>,
        inbox: mpsc::UnboundedReceiver<Outbound>,
    ) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        });
        let (readiness_tx, readiness) = watch::channel(Readiness::Starting);
        tokio::spawn(pump(shared.clone(), inbox, readiness_tx));
        Self {
            outbox,
            shared,
            readiness,
        }
    }

    /// Wait for the worker's lifecycle signal.
    pub async fn wait_ready(&self) -> Result<(), TransportError> {
        let mut readiness = self.readiness.clone();
        let settled = readiness
            .wait_for(|r| *r != Readiness::Starting)
            .await
            .map_err(|_| TransportError::Disconnected)?;
        match &*settled {
            Readiness::Ready => Ok(()),
            Readiness::Failed(err) => Err(fatal(err)),
            Readiness::Starting => Err(TransportError::NotReady),
        }
    }

    /// Send `request` under a fresh id and await its response.
    pub async fn call(&self, request: Request) -> Result<Reply, TransportError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.call_with_id(id, request).await
    }

    /// Send `request` under a caller-chosen id. The id must not belong to
    /// another outstanding call.
    pub async fn call_with_id(&self, id: RequestId, request: Request) -> Result<Reply, TransportError> {
        match &*self.readiness.borrow() {
            Readiness::Ready => {}
            Readiness::Starting => return Err(TransportError::NotReady),
            Readiness::Failed(err) => return Err(fatal(err)),
        }

        let waiter = {
            let mut pending = self.shared.pending();
            if pending.contains_key(&id) {
                return Err(TransportError::DuplicateId(id));
            }
            let (tx, rx) = oneshot::channel();
            pending.insert(id, tx);
            rx
        };

        debug!(id, tag = request.tag(), "sending request");
        if self.outbox.send(Envelope { id, request }).is_err() {
            self.shared.pending().remove(&id);
            return Err(TransportError::Disconnected);
        }

        match waiter.await {
            Ok(response) => response.into_result().map_err(TransportError::from),
            Err(_) => Err(TransportError::Disconnected),
        }
    }

    /// Number of calls awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.shared.pending().len()
    }
}

fn fatal(err: &RemoteError) -> TransportError {
    TransportError::Fatal {
        message: err.message.clone(),
        trace: err.trace.clone(),
    }
}

async fn pump(
    shared: Arc<Shared>,
    mut inbox: mpsc::UnboundedReceiver<Outbound>,
    readiness: watch::Sender<Readiness>,
) {
    while let Some(message) = inbox.recv().await {
        match message {
            Outbound::Response(response) => shared.resolve(response),
            Outbound::Signal(signal) => {
                if *readiness.borrow() != Readiness::Starting {
                    warn!(?signal, "ignoring repeated lifecycle signal");
                    continue;
                }
                match signal {
                    Signal::Ready => {
                        info!("storage worker ready");
                        readiness.send_replace(Readiness::Ready);
                    }
                    Signal::Fatal { message, trace } => {
                        error!(%message, "storage worker failed to start");
                        readiness.send_replace(Readiness::Failed(RemoteError { message, trace }));
                    }
                }
            }
        }
    }

    // Worker gone: dropping the senders wakes every waiter with
    // `Disconnected`.
    let orphaned = {
        let mut pending = shared.pending();
        let n = pending.len();
        pending.clear();
        n
    };
    debug!(orphaned, "transport pump stopped");
}
