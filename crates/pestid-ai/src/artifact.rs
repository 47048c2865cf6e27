//! On-disk model artifact introspection.

use std::path::Path;

use chrono::{DateTime, Utc};
use pestid_core::ArtifactStat;

/// Absolute path, size and mtime of `path`, or `None` if it cannot be read.
pub fn stat(path: &Path) -> Option<ArtifactStat> {
    let meta = std::fs::metadata(path).ok()?;
    if !meta.is_file() {
        return None;
    }
    let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let modified = meta.modified().ok().map(DateTime::<Utc>::from);
    Some(ArtifactStat {
        path,
        size: meta.len(),
        modified,
    })
}
