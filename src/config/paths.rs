//! Path resolution for file-relative configuration values.
//!
//! Relative `build.context`, host-bind volume sources and `env_file` paths
//! resolve against the directory of the file that declared them, not the
//! invocation directory. A leading `~` expands to the invoking user's
//! home. Drive-qualified Windows paths are rewritten to the
//! forward-slash form the engine expects.

use std::path::{Path, PathBuf};

use super::types::is_windows_drive_path;

/// Expand a leading `~` against the user's home directory
pub fn expand_user(path: &str) -> String {
    if path == "~" {
        return home_dir();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        let home = home_dir();
        if !home.is_empty() {
            return format!("{}/{rest}", home.trim_end_matches('/'));
        }
    }
    path.to_string()
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_default()
}

/// Resolve a possibly-relative path against a working directory,
/// expanding `~` first
pub fn expand_path(working_dir: &Path, path: &str) -> PathBuf {
    let expanded = expand_user(path);
    let expanded = Path::new(&expanded);
    if expanded.is_absolute() || is_windows_drive_path(&expanded.to_string_lossy()) {
        expanded.to_path_buf()
    } else {
        normalize(&working_dir.join(expanded))
    }
}

/// Lexically normalize a path, resolving `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Rewrite a drive-qualified Windows path to the engine's expected form:
/// `C:\my\path` becomes `/c/my/path`
pub fn normalize_path_for_engine(path: &str) -> String {
    if !is_windows_drive_path(path) {
        return path.replace('\\', "/");
    }
    let drive = path.as_bytes()[0].to_ascii_lowercase() as char;
    let tail = &path[2..];
    format!("/{drive}{}", tail.replace('\\', "/"))
}

/// Whether a volume source should be treated as a host path rather than a
/// named volume
pub fn is_host_path(source: &str) -> bool {
    source.starts_with('/')
        || source.starts_with('.')
        || source.starts_with('~')
        || source.starts_with('\\')
        || is_windows_drive_path(source)
}
