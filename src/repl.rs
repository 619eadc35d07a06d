//! Interactive terminal on top of a `Session`.
//!
//! Owns the tokio runtime, the line editor and the current environment (a
//! worker thread plus the session talking to it). `sudo reset --confirm`
//! clears the byte store and the loop then tears the environment down and
//! boots a fresh one, which reseeds the defaults.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::client::FsClient;
use crate::shell::{ExecResult, Host, OpenMode, Session, CLEAR_SCREEN};
use crate::store::ByteStore;
use crate::vfs::MemoryFs;
use crate::worker::{Worker, WorkerHandle};

/// Host hooks for a plain terminal: no viewer windows, reset reloads the
/// environment in place.
pub struct TerminalHost {
    store: Arc<dyn ByteStore>,
    reload: AtomicBool,
}

impl TerminalHost {
    pub fn new(store: Arc<dyn ByteStore>) -> Self {
        Self {
            store,
            reload: AtomicBool::new(false),
        }
    }

    /// True once after a reset was performed.
    pub fn take_reload(&self) -> bool {
        self.reload.swap(false, Ordering::SeqCst)
    }
}

impl Host for TerminalHost {
    fn open(&self, path: &str, mode: OpenMode) -> Result<()> {
        info!(path, ?mode, "open requested; no viewer attached to this terminal");
        Ok(())
    }

    fn factory_reset(&self) -> Result<()> {
        self.store.clear_all().context("clearing byte store")?;
        self.reload.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct Environment {
    session: Session,
    worker: WorkerHandle,
}

impl Environment {
    async fn start(store: Arc<dyn ByteStore>, host: Arc<TerminalHost>) -> Result<Self> {
        let (transport, worker) = Worker::new(MemoryFs::new(), store).spawn()?;
        transport
            .wait_ready()
            .await
            .context("storage failed to start")?;
        let client = FsClient::new(transport);
        let version = client.hello().await.context("storage handshake")?;
        info!(%version, "storage worker ready");
        Ok(Self {
            session: Session::new(client, host),
            worker,
        })
    }

    /// Drop the session (closing the channel) and wait for the worker.
    fn shutdown(self) -> Result<()> {
        drop(self.session);
        self.worker.join()
    }
}

fn print_result(result: &ExecResult) {
    if result.stdout == CLEAR_SCREEN {
        print!("{CLEAR_SCREEN}");
        let _ = io::stdout().flush();
    } else if !result.stdout.is_empty() {
        println!("{}", result.stdout);
    }
    if !result.stderr.is_empty() {
        eprintln!("{}", result.stderr);
    }
}

/// Run one line against the persisted tree and return its exit code.
pub fn run_command(store: Arc<dyn ByteStore>, line: &str) -> Result<i32> {
    let runtime = Runtime::new().context("Failed to create tokio runtime")?;
    let host = Arc::new(TerminalHost::new(store.clone()));
    let mut env = runtime.block_on(Environment::start(store, host))?;
    let result = runtime.block_on(env.session.exec(line));
    print_result(&result);
    env.shutdown()?;
    Ok(result.code)
}

/// Interactive loop until EOF.
pub fn run(store: Arc<dyn ByteStore>) -> Result<()> {
    let runtime = Runtime::new().context("Failed to create tokio runtime")?;
    let host = Arc::new(TerminalHost::new(store.clone()));
    let mut rl = DefaultEditor::new().context("Failed to create editor")?;

    println!("termfs v{}", env!("CARGO_PKG_VERSION"));
    println!("Type `help` for commands, Ctrl-D to exit.");

    'reload: loop {
        let mut env = runtime.block_on(Environment::start(store.clone(), host.clone()))?;

        loop {
            let prompt = format!("user@termfs:{}$ ", env.session.cwd());
            match rl.readline(&prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        if let Err(e) = rl.add_history_entry(line.as_str()) {
                            warn!("Failed to add history entry: {}", e);
                        }
                    }
                    let result = runtime.block_on(env.session.exec(&line));
                    print_result(&result);

                    if host.take_reload() {
                        env.shutdown()?;
                        println!("Reloading...");
                        continue 'reload;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("^D");
                    env.shutdown()?;
                    return Ok(());
                }
                Err(err) => {
                    env.shutdown()?;
                    return Err(err).context("reading input");
                }
            }
        }
    }
}
