//! Startup sequence for the storage worker.
//!
//! ```text
//! Unstarted → LoadingSnapshot → Restored ─┐
//!                            └→ Seeding ──┴→ Repairing → Ready
//!                     (any step) ───────────────────────→ Failed
//! ```
//!
//! Seeding only runs when no snapshot exists at all. Repair runs on every
//! startup and only ever adds missing well-known paths; nothing else in the
//! tree is touched.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::path;
use crate::persist::Persister;
use crate::vfs::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    Unstarted,
    LoadingSnapshot,
    Restored,
    Seeding,
    Repairing,
    Ready,
    Failed,
}

/// What a successful bootstrap did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootReport {
    /// A persisted snapshot was found and restored.
    pub restored: bool,
    /// Seed entries that failed and were skipped.
    pub seed_failures: usize,
    /// Well-known paths recreated by the repair pass.
    pub repaired: Vec<String>,
}

// ── Well-known content ────────────────────────────────────────────────

/// Contents of `/etc/termfs/config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub version: String,
    pub hostname: String,
    pub user: String,
    pub home: String,
    pub editor: String,
    pub theme: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            hostname: "termfs".to_string(),
            user: "user".to_string(),
            home: "/home/user".to_string(),
            editor: "/apps/editor".to_string(),
            theme: "/etc/termfs/theme.css".to_string(),
        }
    }
}

pub const CONFIG_PATH: &str = "/etc/termfs/config.json";
pub const THEME_PATH: &str = "/etc/termfs/theme.css";

const DEFAULT_THEME: &str = "\
:root {
  --background: #1e1e2e;
  --foreground: #cdd6f4;
  --accent: #89b4fa;
  --font-family: monospace;
  --font-size: 14px;
}
";

const HOME_README: &str = "\
Welcome to termfs.

Everything under / lives in a virtual filesystem that is saved after
every change. Type `help` for the list of commands.
";

const DESKTOP_WELCOME: &str = "\
Hello! Try:
  ls /
  tree /home
  echo \"note\" > /home/user/Documents/todo.txt
";

const TERMINAL_README: &str = "\
terminal: the command shell.
Paths may be absolute or relative to the current directory.
";

const SEED_DIRS: &[&str] = &[
    "/home",
    "/home/user",
    "/home/user/Desktop",
    "/home/user/Documents",
    "/apps",
    "/apps/terminal",
    "/apps/editor",
    "/apps/viewer",
    "/etc",
    "/etc/termfs",
    "/tmp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Dir,
    File,
}

/// Paths probed on every startup.
const WELL_KNOWN: &[(&str, Kind)] = &[
    ("/home", Kind::Dir),
    ("/home/user", Kind::Dir),
    ("/apps", Kind::Dir),
    ("/etc/termfs", Kind::Dir),
    (CONFIG_PATH, Kind::File),
    (THEME_PATH, Kind::File),
    ("/tmp", Kind::Dir),
];

/// Every path the repair pass guarantees.
pub fn well_known_paths() -> impl Iterator<Item = &'static str> {
    WELL_KNOWN.iter().map(|(p, _)| *p)
}

fn default_config() -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(&SystemConfig::default()).context("encoding default config")
}

fn default_content(path: &str) -> Result<Vec<u8>> {
    Ok(match path {
        CONFIG_PATH => default_config()?,
        THEME_PATH => DEFAULT_THEME.as_bytes().to_vec(),
        "/home/user/README.txt" => HOME_README.as_bytes().to_vec(),
        "/home/user/Desktop/welcome.txt" => DESKTOP_WELCOME.as_bytes().to_vec(),
        "/apps/terminal/README.txt" => TERMINAL_README.as_bytes().to_vec(),
        _ => Vec::new(),
    })
}

const SEED_FILES: &[&str] = &[
    CONFIG_PATH,
    THEME_PATH,
    "/home/user/README.txt",
    "/home/user/Desktop/welcome.txt",
    "/apps/terminal/README.txt",
];

// ── Orchestrator ──────────────────────────────────────────────────────

pub struct Bootstrap<'a> {
    fs: &'a mut dyn Storage,
    persister: &'a Persister,
    state: BootState,
}

impl<'a> Bootstrap<'a> {
    pub fn new(fs: &'a mut dyn Storage, persister: &'a Persister) -> Self {
        Self {
            fs,
            persister,
            state: BootState::Unstarted,
        }
    }

    pub fn state(&self) -> BootState {
        self.state
    }

    fn enter(&mut self, next: BootState) {
        info!(from = ?self.state, to = ?next, "bootstrap");
        self.state = next;
    }

    /// Drive the state machine to `Ready`, or to `Failed` with the error.
    pub fn run(&mut self) -> Result<BootReport> {
        match self.steps() {
            Ok(report) => {
                self.enter(BootState::Ready);
                Ok(report)
            }
            Err(err) => {
                self.enter(BootState::Failed);
                Err(err)
            }
        }
    }

    fn steps(&mut self) -> Result<BootReport> {
        self.enter(BootState::LoadingSnapshot);
        let snapshot = self.persister.load()?;

        let mut report = BootReport {
            restored: false,
            seed_failures: 0,
            repaired: Vec::new(),
        };

        match snapshot {
            Some(bytes) => {
                self.fs
                    .restore(Some(&bytes))
                    .context("restoring persisted snapshot")?;
                report.restored = true;
                self.enter(BootState::Restored);
            }
            None => {
                self.enter(BootState::Seeding);
                report.seed_failures = self.seed()?;
            }
        }

        self.enter(BootState::Repairing);
        report.repaired = self.repair()?;
        Ok(report)
    }

    /// First-run content. Individual failures are logged and skipped.
    fn seed(&mut self) -> Result<usize> {
        let mut failures = 0;

        for dir in SEED_DIRS {
            if let Err(err) = self.fs.mkdir(dir) {
                warn!(path = dir, %err, "seed directory skipped");
                failures += 1;
            }
        }
        for file in SEED_FILES {
            let written = default_content(file)
                .and_then(|data| self.fs.write_file(file, &data).map_err(Into::into));
            if let Err(err) = written {
                warn!(path = file, %err, "seed file skipped");
                failures += 1;
            }
        }

        self.persister.persist(&*self.fs)?;
        info!(failures, "seeded default tree");
        Ok(failures)
    }

    /// Recreate missing well-known paths; persist once if any were added.
    fn repair(&mut self) -> Result<Vec<String>> {
        let mut repaired = Vec::new();

        for (path, kind) in WELL_KNOWN {
            if self.fs.exists(path) {
                continue;
            }
            self.create_ancestors(path)?;
            match kind {
                Kind::Dir => self
                    .fs
                    .mkdir(path)
                    .with_context(|| format!("repairing {path}"))?,
                Kind::File => {
                    let data = default_content(path)?;
                    self.fs
                        .write_file(path, &data)
                        .with_context(|| format!("repairing {path}"))?
                }
            }
            warn!(path, "well-known path was missing; recreated");
            repaired.push(path.to_string());
        }

        if !repaired.is_empty() {
            self.persister.persist(&*self.fs)?;
        }
        Ok(repaired)
    }

    fn create_ancestors(&mut self, target: &str) -> Result<()> {
        let mut chain = Vec::new();
        let mut cursor = path::parent(target);
        while let Some(dir) = cursor {
            if self.fs.exists(dir) {
                break;
            }
            chain.push(dir.to_string());
            cursor = path::parent(dir);
        }
        for dir in chain.iter().rev() {
            self.fs
                .mkdir(dir)
                .with_context(|| format!("repairing ancestor {dir}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ByteStore, MemoryStore, SNAPSHOT_KEY};
    use crate::testing::FlakyFs;
    use crate::vfs::MemoryFs;
    use std::sync::Arc;

    fn boot(store: &Arc<MemoryStore>) -> (MemoryFs, BootReport) {
        let persister = Persister::new(store.clone());
        let mut fs = MemoryFs::new();
        let report = {
            let mut boot = Bootstrap::new(&mut fs, &persister);
            let report = boot.run().unwrap();
            assert_eq!(boot.state(), BootState::Ready);
            report
        };
        (fs, report)
    }

    fn well_known_set(fs: &MemoryFs) -> Vec<&'static str> {
        well_known_paths().filter(|p| fs.exists(p)).collect()
    }

    #[test]
    fn first_run_seeds_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let (fs, report) = boot(&store);

        assert!(!report.restored);
        assert_eq!(report.seed_failures, 0);
        assert!(report.repaired.is_empty());
        assert!(store.get(SNAPSHOT_KEY).unwrap().is_some());
        assert!(fs.exists("/home/user/Desktop/welcome.txt"));

        let config: SystemConfig =
            serde_json::from_slice(&fs.read_file(CONFIG_PATH).unwrap()).unwrap();
        assert_eq!(config, SystemConfig::default());
    }

    #[test]
    fn second_run_restores_without_reseeding() {
        let store = Arc::new(MemoryStore::new());
        let (first, _) = boot(&store);
        let writes = store.write_count();

        let (second, report) = boot(&store);
        assert!(report.restored);
        assert!(report.repaired.is_empty());
        assert_eq!(store.write_count(), writes);
        assert_eq!(well_known_set(&first), well_known_set(&second));
        assert_eq!(well_known_set(&second).len(), WELL_KNOWN.len());
    }

    #[test]
    fn repair_tops_up_missing_paths_and_keeps_user_data() {
        let store = Arc::new(MemoryStore::new());
        let mut fs = MemoryFs::new();
        fs.mkdir("/home").unwrap();
        fs.write_file("/home/notes.txt", b"mine").unwrap();
        Persister::new(store.clone()).persist(&fs).unwrap();

        let (fs, report) = boot(&store);
        assert!(report.restored);
        assert!(report.repaired.contains(&CONFIG_PATH.to_string()));
        assert!(!report.repaired.contains(&"/home".to_string()));
        assert_eq!(fs.read_file("/home/notes.txt").unwrap(), b"mine");
        assert!(fs.exists("/etc/termfs/theme.css"));

        let persisted = store.get(SNAPSHOT_KEY).unwrap().unwrap();
        let mut reloaded = MemoryFs::new();
        reloaded.restore(Some(&persisted)).unwrap();
        assert!(reloaded.exists(CONFIG_PATH));
    }

    #[test]
    fn corrupt_snapshot_fails() {
        let store = Arc::new(MemoryStore::new());
        store.set(SNAPSHOT_KEY, b"garbage").unwrap();
        let persister = Persister::new(store.clone());
        let mut fs = MemoryFs::new();
        let mut boot = Bootstrap::new(&mut fs, &persister);
        let err = boot.run().unwrap_err();
        assert_eq!(boot.state(), BootState::Failed);
        assert!(format!("{err:#}").contains("corrupt snapshot"));
    }

    #[test]
    fn failed_seed_write_is_skipped_and_repaired() {
        let store = Arc::new(MemoryStore::new());
        let persister = Persister::new(store.clone());
        let mut fs = FlakyFs::default()
            .failing_write_once(THEME_PATH)
            .failing_write_once("/home/user/README.txt");

        let report = Bootstrap::new(&mut fs, &persister).run().unwrap();
        assert!(!report.restored);
        assert_eq!(report.seed_failures, 2);
        assert_eq!(report.repaired, vec![THEME_PATH.to_string()]);

        // Not a well-known path, so it stays missing.
        assert!(!fs.exists("/home/user/README.txt"));

        let mut persisted = MemoryFs::new();
        persisted
            .restore(store.get(SNAPSHOT_KEY).unwrap().as_deref())
            .unwrap();
        assert_eq!(persisted.read_file(THEME_PATH).unwrap(), DEFAULT_THEME.as_bytes());
    }
}
