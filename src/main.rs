//! termfs — shell over a durable virtual filesystem.
//!
//! Usage:
//!   termfs                     # interactive shell
//!   termfs -c '<line>'         # run one line and exit with its code
//!   termfs serve               # storage worker as a stdio port
//!
//! Logs go to stderr so they don't corrupt shell output or the binary
//! protocol.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

use termfs::{port, repl, ByteStore, MemoryFs, MemoryStore, RedbStore, Worker};

// ── CLI ───────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "termfs", version, about = "Shell over a durable virtual filesystem")]
struct Cli {
    /// Directory for the redb database.
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Keep everything in memory; nothing survives exit.
    #[arg(long)]
    ephemeral: bool,

    /// Run a single command line and exit with its status.
    #[arg(short = 'c', long = "command", value_name = "LINE")]
    command: Option<String>,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Serve storage requests as length-prefixed bincode frames on
    /// stdin/stdout.
    Serve,
}

fn open_store(cli: &Cli) -> Result<Arc<dyn ByteStore>> {
    if cli.ephemeral {
        return Ok(Arc::new(MemoryStore::new()));
    }
    Ok(Arc::new(RedbStore::open(&cli.data_dir)?))
}

// ── Main ──────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match cli.mode {
        Some(Mode::Serve) => "info",
        None => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let store = open_store(&cli)?;

    if let Some(Mode::Serve) = cli.mode {
        info!(data_dir = %cli.data_dir.display(), ephemeral = cli.ephemeral, "termfs port starting");
        port::serve_stdio(Worker::new(MemoryFs::new(), store))?;
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(line) = cli.command.as_deref() {
        let code = repl::run_command(store, line)?;
        return Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)));
    }

    repl::run(store)?;
    Ok(ExitCode::SUCCESS)
}
