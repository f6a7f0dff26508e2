//! Path resolver (C11): canonicalizes the working directory for usage
//! tracking and expands `~` at service construction time.

use std::path::{Path, PathBuf};

/// Canonicalizes `path`, resolving symlinks so usage records collected from
/// different access paths to the same directory compare equal. Falls back to
/// the unresolved path if canonicalization fails (e.g. the directory no
/// longer exists) rather than erroring a credential access out.
#[must_use]
pub fn canonical_location(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Returns the canonicalized current working directory, used as the default
/// location key for usage tracking.
pub fn current_location() -> std::io::Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    Ok(canonical_location(&cwd))
}

/// Expands a leading `~` or `~/...` to the user's home directory. Paths that
/// do not start with `~` are returned unchanged. Resolved once, at service
/// construction time, never re-expanded on every access.
#[must_use]
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
