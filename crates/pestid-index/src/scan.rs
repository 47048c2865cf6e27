//! Reference file discovery.

use std::path::{Path, PathBuf};

use pestid_core::ClassifyError;
use tracing::{debug, warn};

/// A reference image and the label derived from its file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceFile {
    pub path: PathBuf,
    pub label: String,
}

/// Expand `pattern`, keep regular files, and sort them for a deterministic order.
///
/// No matches is not an error; it yields an empty list.
pub fn scan(pattern: &str) -> Result<Vec<ReferenceFile>, ClassifyError> {
    let entries = glob::glob(pattern)
        .map_err(|e| ClassifyError::InvalidPattern(format!("{pattern}: {e}")))?;

    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => paths.push(path),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "skipping unreadable reference path"),
        }
    }
    paths.sort();

    let files: Vec<ReferenceFile> = paths
        .into_iter()
        .filter_map(|path| label_for(&path).map(|label| ReferenceFile { path, label }))
        .collect();
    debug!(pattern, matched = files.len(), "scanned reference images");
    Ok(files)
}

/// Label = file name without its extension (`static/sau_rom.jpg` → `sau_rom`).
pub fn label_for(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
}
