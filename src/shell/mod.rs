//! Command interpreter.
//!
//! A `Session` owns the working directory and history for one terminal.
//! `exec` records the line, tokenizes it, resolves paths against the cwd
//! and runs the matching built-in. Storage business errors come back as
//! failed results carrying the storage message verbatim; anything else a
//! handler trips over is caught in `exec` and reported the same way.

pub mod command;
pub mod lexer;
pub mod result;
pub mod tree;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::client::FsClient;
use crate::path;
use crate::transport::TransportError;

pub use command::{help_text, Command};
pub use lexer::tokenize;
pub use result::ExecResult;

/// Erase-screen control sequence returned by `clear`.
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    View,
    Edit,
}

/// Hooks into whatever hosts the terminal.
pub trait Host: Send + Sync {
    /// Show `path` in a viewer or editor.
    fn open(&self, path: &str, mode: OpenMode) -> Result<()>;

    /// Wipe the durable store and reload the environment.
    fn factory_reset(&self) -> Result<()>;
}

/// Split a storage outcome: business errors become a failed result for the
/// user, transport faults propagate to `exec`.
fn business<T>(outcome: std::result::Result<T, TransportError>) -> Result<std::result::Result<T, ExecResult>> {
    match outcome {
        Ok(value) => Ok(Ok(value)),
        Err(TransportError::Remote { message, .. }) => Ok(Err(ExecResult::failure(1, message))),
        Err(other) => Err(other.into()),
    }
}

/// Await a storage call inside a handler; on a business error, return it
/// as the handler's result.
macro_rules! try_fs {
    ($call:expr) => {
        match business($call.await)? {
            Ok(value) => value,
            Err(failed) => return Ok(failed),
        }
    };
}

pub struct Session {
    cwd: String,
    history: Vec<String>,
    fs: FsClient,
    host: Arc<dyn Host>,
}

impl Session {
    pub fn new(fs: FsClient, host: Arc<dyn Host>) -> Self {
        Self {
            cwd: "/".to_string(),
            history: Vec::new(),
            fs,
            host,
        }
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    fn resolve(&self, arg: &str) -> String {
        path::resolve(&self.cwd, arg)
    }

    /// Run one input line.
    pub async fn exec(&mut self, line: &str) -> ExecResult {
        let line = line.trim();
        if line.is_empty() {
            return ExecResult::success("");
        }
        self.history.push(line.to_string());

        let tokens = tokenize(line);
        let Some((name, args)) = tokens.split_first() else {
            return ExecResult::success("");
        };

        debug!(command = %name, argc = args.len(), "exec");
        match self.dispatch(name, args).await {
            Ok(result) => result,
            Err(err) => {
                warn!(command = %name, error = %format!("{err:#}"), "command faulted");
                ExecResult::failure(1, format!("{err:#}"))
            }
        }
    }

    async fn dispatch(&mut self, name: &str, args: &[String]) -> Result<ExecResult> {
        let Some(cmd) = Command::parse(name) else {
            return Ok(ExecResult::failure(1, format!("command not found: {name}")));
        };

        match cmd {
            Command::Help => Ok(ExecResult::success(help_text())),
            Command::Clear => Ok(ExecResult::success(CLEAR_SCREEN)),
            Command::Pwd => Ok(ExecResult::success(self.cwd.clone())),
            Command::Cd => self.cd(args).await,
            Command::Ls => self.ls(args).await,
            Command::Tree => {
                let target = self.resolve(args.first().map(String::as_str).unwrap_or(""));
                Ok(ExecResult::success(tree::render(&self.fs, &target).await?))
            }
            Command::Mkdir | Command::Rm | Command::Rmdir => self.single_path(cmd, args).await,
            Command::Mv | Command::Cp => self.two_paths(cmd, args).await,
            Command::Cat => self.cat(args).await,
            Command::Echo => self.echo(args).await,
            Command::Stat => self.stat(args).await,
            Command::Open => self.open(args, OpenMode::View).await,
            Command::Edit => self.open(args, OpenMode::Edit).await,
            Command::History => Ok(ExecResult::success(self.render_history())),
            Command::Reset => Ok(ExecResult::failure(
                1,
                "reset: this erases everything; run `sudo reset --confirm` to proceed",
            )),
            Command::Sudo => self.sudo(args),
        }
    }

    async fn cd(&mut self, args: &[String]) -> Result<ExecResult> {
        let target = self.resolve(args.first().map(String::as_str).unwrap_or("/"));
        match self.fs.stat(&target).await {
            Ok(stat) if stat.is_dir => {
                self.cwd = target;
                Ok(ExecResult::success(""))
            }
            Ok(_) => Ok(ExecResult::failure(1, format!("not a directory: {target}"))),
            Err(TransportError::Remote { .. }) => {
                Ok(ExecResult::failure(1, format!("directory not found: {target}")))
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn ls(&self, args: &[String]) -> Result<ExecResult> {
        let target = self.resolve(args.first().map(String::as_str).unwrap_or(""));
        let names = try_fs!(self.fs.readdir(&target));
        Ok(ExecResult::success(names.join("\n")))
    }

    async fn single_path(&self, cmd: Command, args: &[String]) -> Result<ExecResult> {
        let Some(arg) = args.first() else {
            return Ok(ExecResult::failure(1, cmd.usage()));
        };
        let target = self.resolve(arg);
        match cmd {
            Command::Mkdir => try_fs!(self.fs.mkdir(&target)),
            Command::Rm => try_fs!(self.fs.rm(&target)),
            _ => try_fs!(self.fs.rmdir(&target)),
        }
        Ok(ExecResult::success(""))
    }

    async fn two_paths(&self, cmd: Command, args: &[String]) -> Result<ExecResult> {
        let [from, to, ..] = args else {
            return Ok(ExecResult::failure(1, cmd.usage()));
        };
        let (from, to) = (self.resolve(from), self.resolve(to));
        if cmd == Command::Mv {
            try_fs!(self.fs.mv(&from, &to));
        } else {
            try_fs!(self.fs.cp(&from, &to));
        }
        Ok(ExecResult::success(""))
    }

    async fn cat(&self, args: &[String]) -> Result<ExecResult> {
        let Some(arg) = args.first() else {
            return Ok(ExecResult::failure(1, Command::Cat.usage()));
        };
        let data = try_fs!(self.fs.read_file(&self.resolve(arg)));
        Ok(ExecResult::success(String::from_utf8_lossy(&data).into_owned()))
    }

    async fn echo(&self, args: &[String]) -> Result<ExecResult> {
        let redirect = args.iter().position(|a| a == ">");
        let (text, file) = match redirect {
            Some(at) if at + 1 < args.len() => (args[..at].join(" "), &args[at + 1]),
            _ => return Ok(ExecResult::failure(1, Command::Echo.usage())),
        };
        try_fs!(self.fs.write_file(&self.resolve(file), text.as_bytes()));
        Ok(ExecResult::success(""))
    }

    async fn stat(&self, args: &[String]) -> Result<ExecResult> {
        let Some(arg) = args.first() else {
            return Ok(ExecResult::failure(1, Command::Stat.usage()));
        };
        let target = self.resolve(arg);
        let stat = try_fs!(self.fs.stat(&target));
        let kind = if stat.is_dir { "directory" } else { "file" };
        Ok(ExecResult::success(format!(
            "path: {target}\ntype: {kind}\nsize: {} bytes",
            stat.size
        )))
    }

    async fn open(&self, args: &[String], mode: OpenMode) -> Result<ExecResult> {
        let cmd = match mode {
            OpenMode::View => Command::Open,
            OpenMode::Edit => Command::Edit,
        };
        let Some(arg) = args.first() else {
            return Ok(ExecResult::failure(1, cmd.usage()));
        };
        let target = self.resolve(arg);

        match business(self.fs.stat(&target).await)? {
            Ok(stat) if stat.is_dir => {
                return Ok(ExecResult::failure(1, format!("is a directory: {target}")));
            }
            Ok(_) => {}
            Err(missing) if mode == OpenMode::View => return Ok(missing),
            Err(_) => try_fs!(self.fs.write_file(&target, b"")),
        }

        self.host
            .open(&target, mode)
            .with_context(|| format!("{}: {target}", cmd.name()))?;
        let verb = match mode {
            OpenMode::View => "opened",
            OpenMode::Edit => "editing",
        };
        Ok(ExecResult::success(format!("{verb} {target}")))
    }

    fn sudo(&self, args: &[String]) -> Result<ExecResult> {
        let Some((sub, rest)) = args.split_first() else {
            return Ok(ExecResult::failure(1, Command::Sudo.usage()));
        };
        if sub != "reset" {
            return Ok(ExecResult::failure(1, format!("sudo: {sub}: command not found")));
        }
        if !rest.iter().any(|a| a == "--confirm") {
            return Ok(ExecResult::success(
                "warning: this permanently erases every file, including the defaults.\n\
                 Run `sudo reset --confirm` to continue.",
            ));
        }
        warn!("factory reset requested");
        self.host.factory_reset().context("sudo reset")?;
        Ok(ExecResult::success("All data erased. Reloading..."))
    }

    fn render_history(&self) -> String {
        self.history
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:>5}  {line}", i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
