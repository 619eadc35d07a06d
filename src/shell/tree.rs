//! Unix-style recursive listing for `tree`.
//!
//! ```text
//! docs
//! ├── sub/
//! │   └── inner.txt
//! └── a.txt
//! ```
//!
//! Each level lists directories first, then files, each group sorted by
//! name. An entry that cannot be stat'ed is shown as a file; a directory
//! that cannot be listed shows no children. Only transport faults abort
//! the render.

use crate::client::FsClient;
use crate::path;
use crate::transport::TransportError;

struct Child {
    name: String,
    is_dir: bool,
}

/// Business errors fall back to `fallback`; transport faults propagate.
fn tolerate<T>(outcome: Result<T, TransportError>, fallback: T) -> Result<T, TransportError> {
    match outcome {
        Err(TransportError::Remote { .. }) => Ok(fallback),
        other => other,
    }
}

async fn children(fs: &FsClient, dir: &str) -> Result<Vec<Child>, TransportError> {
    let names = tolerate(fs.readdir(dir).await, Vec::new())?;

    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for name in names {
        let is_dir = tolerate(fs.stat(&path::join(dir, &name)).await.map(|s| s.is_dir), false)?;
        if is_dir {
            dirs.push(name);
        } else {
            files.push(name);
        }
    }
    dirs.sort();
    files.sort();

    let dirs = dirs.into_iter().map(|name| Child { name, is_dir: true });
    let files = files.into_iter().map(|name| Child { name, is_dir: false });
    Ok(dirs.chain(files).collect())
}

async fn render_level(
    fs: &FsClient,
    dir: &str,
    prefix: &str,
    lines: &mut Vec<String>,
) -> Result<(), TransportError> {
    let entries = children(fs, dir).await?;
    let count = entries.len();

    for (i, entry) in entries.into_iter().enumerate() {
        let last = i + 1 == count;
        let connector = if last { "└── " } else { "├── " };
        let suffix = if entry.is_dir { "/" } else { "" };
        lines.push(format!("{prefix}{connector}{}{suffix}", entry.name));

        if entry.is_dir {
            let nested = format!("{prefix}{}", if last { "    " } else { "│   " });
            let child = path::join(dir, &entry.name);
            Box::pin(render_level(fs, &child, &nested, lines)).await?;
        }
    }
    Ok(())
}

/// Render the subtree at normalized path `root`. The first line is the
/// root's own name (`/` for the root directory).
pub async fn render(fs: &FsClient, root: &str) -> Result<String, TransportError> {
    let mut lines = vec![path::basename(root).to_string()];
    render_level(fs, root, "", &mut lines).await?;
    Ok(lines.join("\n"))
}
