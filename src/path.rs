//! Absolute path handling shared by the shell and the storage engine.
//!
//! Paths are plain `/`-separated strings. A normalized path is absolute,
//! has no empty, `.` or `..` segments and no trailing slash (except `/`).

/// Resolve `arg` against `cwd` and normalize the result.
///
/// `""` and `"."` mean `cwd`; a leading `/` makes `arg` absolute;
/// anything else is appended to `cwd`.
pub fn resolve(cwd: &str, arg: &str) -> String {
    let joined = if arg.is_empty() || arg == "." {
        cwd.to_string()
    } else if arg.starts_with('/') {
        arg.to_string()
    } else {
        format!("{}/{}", cwd.trim_end_matches('/'), arg)
    };
    normalize(&joined)
}

/// Collapse `.`, `..` and repeated slashes. `..` at the root stays at the
/// root.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Parent of a normalized path; `None` for `/`.
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

/// Last segment of a normalized path; `/` for the root.
pub fn basename(path: &str) -> &str {
    if path == "/" {
        return "/";
    }
    path.rsplit('/').next().unwrap_or(path)
}

/// Join a child name onto a normalized directory path.
pub fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}
