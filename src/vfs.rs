//! Storage capability: the filesystem tree the worker hosts.
//!
//! `MemoryFs` keeps every entry in a `BTreeMap` keyed by normalized
//! absolute path, so a directory's descendants are a contiguous key range.
//! Snapshots are `[b"TFS1"][blake3(body)][bincode(body)]`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::path;

// ── Types ─────────────────────────────────────────────────────────────

/// Exactly one of `is_dir` / `is_file` is set for an existing path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    pub is_dir: bool,
    pub is_file: bool,
    /// Byte length for files, 0 for directories.
    pub size: u64,
}

impl Stat {
    pub fn dir() -> Self {
        Self {
            is_dir: true,
            is_file: false,
            size: 0,
        }
    }

    pub fn file(size: u64) -> Self {
        Self {
            is_dir: false,
            is_file: true,
            size,
        }
    }
}

/// Business errors. The `Display` text is what crosses the wire and what
/// the shell prints verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("file exists: {0}")]
    AlreadyExists(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("operation not permitted: {0}")]
    NotPermitted(String),

    #[error("snapshot encoding failed: {0}")]
    Encode(String),

    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

pub type FsResult<T> = std::result::Result<T, FsError>;

/// The operations the worker drives. Calls are synchronous; the worker
/// is the only caller and runs one request at a time.
pub trait Storage: Send {
    fn mkdir(&mut self, path: &str) -> FsResult<()>;
    fn readdir(&self, path: &str) -> FsResult<Vec<String>>;
    fn read_file(&self, path: &str) -> FsResult<Vec<u8>>;
    fn write_file(&mut self, path: &str, data: &[u8]) -> FsResult<()>;
    fn stat(&self, path: &str) -> FsResult<Stat>;
    fn rm(&mut self, path: &str) -> FsResult<()>;
    fn rmdir(&mut self, path: &str) -> FsResult<()>;
    fn mv(&mut self, from: &str, to: &str) -> FsResult<()>;
    fn cp(&mut self, from: &str, to: &str) -> FsResult<()>;

    /// Serialize the whole tree.
    fn snapshot(&self) -> FsResult<Vec<u8>>;

    /// Replace the whole tree. `None` resets to an empty root.
    fn restore(&mut self, bytes: Option<&[u8]>) -> FsResult<()>;

    fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok()
    }
}

// ── MemoryFs ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum Node {
    Dir,
    File(Vec<u8>),
}

const MAGIC: &[u8; 4] = b"TFS1";
const DIGEST_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct MemoryFs {
    entries: BTreeMap<String, Node>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// An empty tree: just `/`.
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("/".to_string(), Node::Dir);
        Self { entries }
    }

    /// Storage paths must be absolute; normalize whatever else arrives.
    fn canonical(raw: &str) -> FsResult<String> {
        if !raw.starts_with('/') {
            return Err(FsError::InvalidPath(raw.to_string()));
        }
        Ok(path::normalize(raw))
    }

    /// The parent of `path` must exist and be a directory.
    fn require_parent_dir(&self, path: &str) -> FsResult<()> {
        let Some(parent) = path::parent(path) else {
            return Ok(());
        };
        match self.entries.get(parent) {
            Some(Node::Dir) => Ok(()),
            Some(Node::File(_)) => Err(FsError::NotADirectory(parent.to_string())),
            None => Err(FsError::NotFound(parent.to_string())),
        }
    }

    /// Keys strictly below `dir`, in order.
    fn descendants<'a>(&'a self, dir: &str) -> impl Iterator<Item = &'a String> + 'a {
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{dir}/")
        };
        self.entries
            .range(prefix.clone()..)
            .map(|(k, _)| k)
            .take_while(move |k| k.starts_with(&prefix))
            .filter(|k| k.as_str() != "/")
    }

    fn encode(entries: &BTreeMap<String, Node>) -> FsResult<Vec<u8>> {
        let body = bincode::serialize(entries).map_err(|e| FsError::Encode(e.to_string()))?;
        let digest = blake3::hash(&body);
        let mut out = Vec::with_capacity(MAGIC.len() + DIGEST_LEN + body.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(digest.as_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> FsResult<BTreeMap<String, Node>> {
        let corrupt = |why: &str| FsError::CorruptSnapshot(why.to_string());

        if bytes.len() < MAGIC.len() + DIGEST_LEN {
            return Err(corrupt("truncated header"));
        }
        let (magic, rest) = bytes.split_at(MAGIC.len());
        if magic != MAGIC {
            return Err(corrupt("bad magic"));
        }
        let (digest, body) = rest.split_at(DIGEST_LEN);
        if blake3::hash(body).as_bytes().as_slice() != digest {
            return Err(corrupt("checksum mismatch"));
        }
        let entries: BTreeMap<String, Node> =
            bincode::deserialize(body).map_err(|e| FsError::CorruptSnapshot(e.to_string()))?;

        if entries.get("/") != Some(&Node::Dir) {
            return Err(corrupt("missing root directory"));
        }
        for key in entries.keys() {
            if path::normalize(key) != *key {
                return Err(FsError::CorruptSnapshot(format!("unnormalized path {key}")));
            }
            if let Some(parent) = path::parent(key) {
                if entries.get(parent) != Some(&Node::Dir) {
                    return Err(FsError::CorruptSnapshot(format!("orphaned entry {key}")));
                }
            }
        }
        Ok(entries)
    }
}

impl Storage for MemoryFs {
    #[instrument(skip(self))]
    fn mkdir(&mut self, raw: &str) -> FsResult<()> {
        let path = Self::canonical(raw)?;
        match self.entries.get(&path) {
            Some(Node::Dir) => return Ok(()),
            Some(Node::File(_)) => return Err(FsError::AlreadyExists(path)),
            None => {}
        }
        self.require_parent_dir(&path)?;
        self.entries.insert(path, Node::Dir);
        Ok(())
    }

    fn readdir(&self, raw: &str) -> FsResult<Vec<String>> {
        let path = Self::canonical(raw)?;
        match self.entries.get(&path) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => return Err(FsError::NotADirectory(path)),
            None => return Err(FsError::NotFound(path)),
        }
        let names = self
            .descendants(&path)
            .filter(|k| path::parent(k) == Some(path.as_str()))
            .map(|k| path::basename(k).to_string())
            .collect();
        Ok(names)
    }

    fn read_file(&self, raw: &str) -> FsResult<Vec<u8>> {
        let path = Self::canonical(raw)?;
        match self.entries.get(&path) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(Node::Dir) => Err(FsError::IsADirectory(path)),
            None => Err(FsError::NotFound(path)),
        }
    }

    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write_file(&mut self, raw: &str, data: &[u8]) -> FsResult<()> {
        let path = Self::canonical(raw)?;
        if let Some(Node::Dir) = self.entries.get(&path) {
            return Err(FsError::IsADirectory(path));
        }
        self.require_parent_dir(&path)?;
        self.entries.insert(path, Node::File(data.to_vec()));
        Ok(())
    }

    fn stat(&self, raw: &str) -> FsResult<Stat> {
        let path = Self::canonical(raw)?;
        match self.entries.get(&path) {
            Some(Node::Dir) => Ok(Stat::dir()),
            Some(Node::File(data)) => Ok(Stat::file(data.len() as u64)),
            None => Err(FsError::NotFound(path)),
        }
    }

    #[instrument(skip(self))]
    fn rm(&mut self, raw: &str) -> FsResult<()> {
        let path = Self::canonical(raw)?;
        match self.entries.get(&path) {
            Some(Node::File(_)) => {
                self.entries.remove(&path);
                Ok(())
            }
            Some(Node::Dir) => Err(FsError::IsADirectory(path)),
            None => Err(FsError::NotFound(path)),
        }
    }

    #[instrument(skip(self))]
    fn rmdir(&mut self, raw: &str) -> FsResult<()> {
        let path = Self::canonical(raw)?;
        if path == "/" {
            return Err(FsError::NotPermitted(path));
        }
        match self.entries.get(&path) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => return Err(FsError::NotADirectory(path)),
            None => return Err(FsError::NotFound(path)),
        }
        if self.descendants(&path).next().is_some() {
            return Err(FsError::NotEmpty(path));
        }
        self.entries.remove(&path);
        Ok(())
    }

    #[instrument(skip(self))]
    fn mv(&mut self, raw_from: &str, raw_to: &str) -> FsResult<()> {
        let from = Self::canonical(raw_from)?;
        let to = Self::canonical(raw_to)?;
        if from == "/" {
            return Err(FsError::NotPermitted(from));
        }
        let Some(node) = self.entries.get(&from) else {
            return Err(FsError::NotFound(from));
        };
        if self.entries.contains_key(&to) {
            return Err(FsError::AlreadyExists(to));
        }
        if *node == Node::Dir && to.starts_with(&format!("{from}/")) {
            return Err(FsError::NotPermitted(to));
        }
        self.require_parent_dir(&to)?;

        let mut moved: Vec<String> = self.descendants(&from).cloned().collect();
        moved.insert(0, from.clone());
        for old in moved {
            if let Some(node) = self.entries.remove(&old) {
                let new = format!("{}{}", to, &old[from.len()..]);
                self.entries.insert(new, node);
            }
        }
        debug!(from = %from, to = %to, "moved");
        Ok(())
    }

    #[instrument(skip(self))]
    fn cp(&mut self, raw_from: &str, raw_to: &str) -> FsResult<()> {
        let from = Self::canonical(raw_from)?;
        let to = Self::canonical(raw_to)?;
        let data = match self.entries.get(&from) {
            Some(Node::File(data)) => data.clone(),
            Some(Node::Dir) => return Err(FsError::IsADirectory(from)),
            None => return Err(FsError::NotFound(from)),
        };
        if let Some(Node::Dir) = self.entries.get(&to) {
            return Err(FsError::IsADirectory(to));
        }
        self.require_parent_dir(&to)?;
        self.entries.insert(to, Node::File(data));
        Ok(())
    }

    fn snapshot(&self) -> FsResult<Vec<u8>> {
        Self::encode(&self.entries)
    }

    #[instrument(skip(self, bytes), fields(len = bytes.map(<[u8]>::len)))]
    fn restore(&mut self, bytes: Option<&[u8]>) -> FsResult<()> {
        self.entries = match bytes {
            Some(bytes) => Self::decode(bytes)?,
            None => Self::new().entries,
        };
        debug!(entries = self.entries.len(), "tree restored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fs_with_docs() -> MemoryFs {
        let mut fs = MemoryFs::new();
        fs.mkdir("/docs").unwrap();
        fs.mkdir("/docs/x").unwrap();
        fs.write_file("/docs/a.txt", b"hi").unwrap();
        fs
    }

    #[test]
    fn readdir_lists_direct_children_only() {
        let mut fs = fs_with_docs();
        fs.write_file("/docs/x/deep.txt", b"").unwrap();
        fs.mkdir("/docsy").unwrap();
        let mut names = fs.readdir("/docs").unwrap();
        names.sort();
        assert_eq!(names, vec!["a.txt", "x"]);
        let mut root = fs.readdir("/").unwrap();
        root.sort();
        assert_eq!(root, vec!["docs", "docsy"]);
    }

    #[test]
    fn mkdir_rules() {
        let mut fs = fs_with_docs();
        assert!(fs.mkdir("/docs").is_ok());
        assert_eq!(
            fs.mkdir("/docs/a.txt"),
            Err(FsError::AlreadyExists("/docs/a.txt".into()))
        );
        assert_eq!(fs.mkdir("/no/such"), Err(FsError::NotFound("/no".into())));
        assert_eq!(fs.mkdir("relative"), Err(FsError::InvalidPath("relative".into())));
    }

    #[test]
    fn stat_distinguishes_files_and_dirs() {
        let fs = fs_with_docs();
        assert_eq!(fs.stat("/docs").unwrap(), Stat::dir());
        assert_eq!(fs.stat("/docs/a.txt").unwrap(), Stat::file(2));
        assert_eq!(fs.stat("/nope"), Err(FsError::NotFound("/nope".into())));
    }

    #[test]
    fn rm_and_rmdir_respect_types() {
        let mut fs = fs_with_docs();
        assert_eq!(fs.rm("/docs"), Err(FsError::IsADirectory("/docs".into())));
        assert_eq!(fs.rmdir("/docs"), Err(FsError::NotEmpty("/docs".into())));
        assert_eq!(
            fs.rmdir("/docs/a.txt"),
            Err(FsError::NotADirectory("/docs/a.txt".into()))
        );
        assert_eq!(fs.rmdir("/"), Err(FsError::NotPermitted("/".into())));
        fs.rm("/docs/a.txt").unwrap();
        fs.rmdir("/docs/x").unwrap();
        fs.rmdir("/docs").unwrap();
        assert!(!fs.exists("/docs"));
    }

    #[test]
    fn mv_carries_subtree() {
        let mut fs = fs_with_docs();
        fs.write_file("/docs/x/inner", b"1").unwrap();
        fs.mv("/docs", "/archive").unwrap();
        assert!(!fs.exists("/docs"));
        assert_eq!(fs.read_file("/archive/x/inner").unwrap(), b"1");
        assert_eq!(fs.read_file("/archive/a.txt").unwrap(), b"hi");
    }

    #[test]
    fn mv_rejects_conflicts_and_cycles() {
        let mut fs = fs_with_docs();
        assert_eq!(
            fs.mv("/docs/a.txt", "/docs/x"),
            Err(FsError::AlreadyExists("/docs/x".into()))
        );
        assert_eq!(
            fs.mv("/docs", "/docs/x/inside"),
            Err(FsError::NotPermitted("/docs/x/inside".into()))
        );
        assert_eq!(fs.mv("/ghost", "/b"), Err(FsError::NotFound("/ghost".into())));
    }

    #[test]
    fn cp_is_files_only() {
        let mut fs = fs_with_docs();
        fs.cp("/docs/a.txt", "/b.txt").unwrap();
        assert_eq!(fs.read_file("/b.txt").unwrap(), b"hi");
        assert_eq!(fs.cp("/docs", "/d2"), Err(FsError::IsADirectory("/docs".into())));
        assert_eq!(
            fs.cp("/b.txt", "/docs/x"),
            Err(FsError::IsADirectory("/docs/x".into()))
        );
    }

    #[test]
    fn snapshot_restores_equivalent_tree() {
        let fs = fs_with_docs();
        let bytes = fs.snapshot().unwrap();

        let mut other = MemoryFs::new();
        other.restore(Some(&bytes)).unwrap();
        assert_eq!(other.read_file("/docs/a.txt").unwrap(), b"hi");
        assert_eq!(other.stat("/docs/x").unwrap(), Stat::dir());
        assert_eq!(other.snapshot().unwrap(), bytes);
    }

    #[test]
    fn corrupt_snapshot_is_rejected_and_tree_kept() {
        let fs = fs_with_docs();
        let mut bytes = fs.snapshot().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let mut target = fs_with_docs();
        assert!(matches!(
            target.restore(Some(&bytes)),
            Err(FsError::CorruptSnapshot(_))
        ));
        assert!(target.exists("/docs/a.txt"));
        assert!(matches!(
            target.restore(Some(b"junk")),
            Err(FsError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn restore_from_absence_is_empty_root() {
        let mut fs = fs_with_docs();
        fs.restore(None).unwrap();
        assert!(fs.readdir("/").unwrap().is_empty());
    }
}
