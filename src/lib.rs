//! termfs — an interactive shell over a durable virtual filesystem.
//!
//! The filesystem lives in a storage worker on its own thread and is only
//! reachable through messages:
//!
//! ```text
//! Session ──tokenize/resolve──▶ FsClient ──Envelope──▶ Worker ──▶ MemoryFs
//!    ▲                            ▲                       │
//!    └──────── ExecResult ────────┴────── Outbound ◀──────┴──▶ ByteStore
//! ```
//!
//! The worker restores or seeds the tree at startup, repairs well-known
//! paths, and writes a snapshot to the byte store after every mutation
//! before it replies.

pub mod bootstrap;
pub mod client;
pub mod path;
pub mod persist;
pub mod port;
pub mod protocol;
pub mod repl;
pub mod shell;
pub mod store;
pub mod transport;
pub mod vfs;
pub mod worker;

#[cfg(test)]
mod testing;

pub use client::FsClient;
pub use shell::{ExecResult, Host, OpenMode, Session};
pub use store::{ByteStore, MemoryStore, RedbStore};
pub use transport::{Transport, TransportError};
pub use vfs::MemoryFs;
pub use worker::{Worker, WorkerHandle};
