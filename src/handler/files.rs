//! File route resolution
//!
//! Maps request paths onto files below a configured directory and opens them
//! as [`FileSource`]s.

use crate::logger;
use crate::source::{FileSource, SourceError};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Resolve `path` below `dir`, after stripping the route prefix.
///
/// Returns `None` for missing files, directories and anything that escapes
/// `dir` through `..` or symlinks.
pub async fn resolve_in_directory(dir: &str, path: &str, route_prefix: &str) -> Option<PathBuf> {
    let clean_path = path.trim_start_matches('/');
    let prefix_clean = route_prefix.trim_matches('/');
    let relative_path = if prefix_clean.is_empty() {
        clean_path
    } else {
        clean_path
            .strip_prefix(prefix_clean)
            .unwrap_or(clean_path)
            .trim_start_matches('/')
    };
    if relative_path.is_empty() || relative_path.split('/').any(|part| part == "..") {
        return None;
    }

    let dir_canonical = match fs::canonicalize(dir).await {
        Ok(p) => p,
        Err(e) => {
            logger::log_warning(&format!(
                "Route directory not found or inaccessible '{dir}': {e}"
            ));
            return None;
        }
    };

    // Not found is the common case, no need to log it
    let file_canonical = fs::canonicalize(dir_canonical.join(relative_path)).await.ok()?;
    if !file_canonical.starts_with(&dir_canonical) {
        logger::log_warning(&format!(
            "Path traversal attempt blocked: {} -> {}",
            path,
            file_canonical.display()
        ));
        return None;
    }
    let metadata = fs::metadata(&file_canonical).await.ok()?;
    metadata.is_file().then_some(file_canonical)
}

/// Open a resolved path as a source
pub async fn open_source(path: &Path) -> Option<FileSource> {
    match FileSource::load(path).await {
        Ok(source) => Some(source),
        Err(SourceError::Unavailable { reason }) => {
            logger::log_warning(&reason);
            None
        }
        Err(e) => {
            logger::log_error(&format!("Failed to open '{}': {e}", path.display()));
            None
        }
    }
}
