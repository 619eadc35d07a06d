//! Wire protocol between the shell and the storage worker.
//!
//! Inbound to the worker: `Envelope { id, request }`.
//! Outbound from the worker: exactly one lifecycle `Signal` first, then one
//! `Response` per envelope, tagged with the envelope's id.
//!
//! In stdio port mode every message is a length-prefixed bincode frame
//! (see `frame`); in-process the same types travel over channels.

use serde::{Deserialize, Serialize};

use crate::vfs::Stat;

/// Caller-generated correlation token; unique among outstanding requests.
pub type RequestId = u64;

// ── Requests ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    /// Handshake; replies with the worker version.
    Hello,

    /// Create a directory. Succeeds if it already exists as a directory.
    FsMkdir { path: String },

    /// List child names of a directory.
    FsReaddir { path: String },

    /// Create or overwrite a file.
    FsWriteFile { path: String, data: Vec<u8> },

    /// Read a file's bytes.
    FsReadFile { path: String },

    FsStat { path: String },

    /// Remove a file.
    FsRm { path: String },

    /// Remove an empty directory.
    FsRmdir { path: String },

    FsMv { from: String, to: String },

    /// Copy a file (directories are rejected).
    FsCp { from: String, to: String },
}

impl Request {
    /// Wire tag, as it appears in logs.
    pub fn tag(&self) -> &'static str {
        match self {
            Request::Hello => "hello",
            Request::FsMkdir { .. } => "fs_mkdir",
            Request::FsReaddir { .. } => "fs_readdir",
            Request::FsWriteFile { .. } => "fs_write_file",
            Request::FsReadFile { .. } => "fs_read_file",
            Request::FsStat { .. } => "fs_stat",
            Request::FsRm { .. } => "fs_rm",
            Request::FsRmdir { .. } => "fs_rmdir",
            Request::FsMv { .. } => "fs_mv",
            Request::FsCp { .. } => "fs_cp",
        }
    }

    /// Whether a successful run of this request changes the tree and must
    /// be followed by a snapshot write.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Request::FsMkdir { .. }
                | Request::FsWriteFile { .. }
                | Request::FsRm { .. }
                | Request::FsRmdir { .. }
                | Request::FsMv { .. }
                | Request::FsCp { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: RequestId,
    pub request: Request,
}

// ── Responses ─────────────────────────────────────────────────────────

/// Operation-specific success payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Unit,

    Hello { version: String },

    Names { names: Vec<String> },

    Bytes { data: Vec<u8> },

    Stat { stat: Stat },
}

/// Failure payload carried across the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub message: String,
    pub trace: Option<String>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: None,
        }
    }

    /// Build from an error chain. The message is the whole `{:#}` chain so
    /// the root cause survives; the `{:?}` rendering becomes the trace.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        Self {
            message: format!("{err:#}"),
            trace: Some(format!("{err:?}")),
        }
    }
}

/// `ok == true` ⇔ `result.is_some()` ⇔ `error.is_none()`.
///
/// Fields are private so the invariant can only be built through
/// [`Response::success`] and [`Response::failure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    id: RequestId,
    ok: bool,
    result: Option<Reply>,
    error: Option<RemoteError>,
}

impl Response {
    pub fn success(id: RequestId, reply: Reply) -> Self {
        Self {
            id,
            ok: true,
            result: Some(reply),
            error: None,
        }
    }

    pub fn failure(id: RequestId, error: RemoteError) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(error),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }

    /// Split into the outcome the caller awaits.
    pub fn into_result(self) -> Result<Reply, RemoteError> {
        match (self.ok, self.result, self.error) {
            (true, Some(reply), _) => Ok(reply),
            (false, _, Some(error)) => Err(error),
            // Unreachable through the constructors; tolerate a hand-built
            // frame from a foreign peer.
            (true, None, _) => Ok(Reply::Unit),
            (false, _, None) => Err(RemoteError::new("remote failure without error payload")),
        }
    }
}

// ── Worker → caller ───────────────────────────────────────────────────

/// Unsolicited lifecycle announcement, sent exactly once before any
/// request is served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Ready,
    Fatal { message: String, trace: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outbound {
    Signal(Signal),
    Response(Response),
}
