//! Served index with serialized rebuilds.
//!
//! Readers take an `Arc<Snapshot>` and keep it for the duration of a
//! request, so a rebuild that lands mid-request never mixes generations.

use std::sync::{Arc, Mutex, TryLockError};
use std::time::Instant;

use arc_swap::ArcSwap;
use pestid_ai::{ImageEmbedder, open_image};
use pestid_core::{BuildReport, ClassifyError, IndexInfo};
use tracing::{info, warn};

use crate::scan::scan;
use crate::snapshot::{ReferenceEntry, Snapshot};

pub struct ReferenceIndex {
    current: ArcSwap<Snapshot>,
    rebuild_lock: Mutex<()>,
    embedder: Arc<dyn ImageEmbedder>,
    batch_size: usize,
}

impl ReferenceIndex {
    /// An unbuilt index (generation 0) embedding in chunks of `batch_size`.
    pub fn new(embedder: Arc<dyn ImageEmbedder>, batch_size: usize) -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::empty()),
            rebuild_lock: Mutex::new(()),
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// The snapshot currently served.
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn info(&self) -> IndexInfo {
        self.current.load().info()
    }

    /// Rebuild from `pattern` and swap the result in.
    ///
    /// Fails with [`ClassifyError::RebuildInProgress`] if another build is
    /// running. On any failure the previous snapshot keeps being served.
    pub fn build(&self, pattern: &str) -> Result<BuildReport, ClassifyError> {
        let _guard = match self.rebuild_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(ClassifyError::RebuildInProgress),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        self.build_locked(pattern)
    }

    /// Return the served snapshot, building it first if it never was.
    ///
    /// Waits for a build already in progress instead of starting another.
    pub fn ensure_built(&self, pattern: &str) -> Result<Arc<Snapshot>, ClassifyError> {
        let snapshot = self.current();
        if snapshot.generation() > 0 {
            return Ok(snapshot);
        }

        let _guard = self
            .rebuild_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let snapshot = self.current();
        if snapshot.generation() > 0 {
            return Ok(snapshot);
        }
        self.build_locked(pattern)?;
        Ok(self.current())
    }

    fn build_locked(&self, pattern: &str) -> Result<BuildReport, ClassifyError> {
        let start = Instant::now();
        let files = scan(pattern)?;

        let mut entries = Vec::with_capacity(files.len());
        for chunk in files.chunks(self.batch_size) {
            let images = chunk
                .iter()
                .map(|file| {
                    open_image(&file.path).inspect_err(|_| {
                        warn!(path = %file.path.display(), "undecodable reference image")
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let embeddings = self.embedder.embed_batch(&images)?;
            if embeddings.len() != chunk.len() {
                return Err(ClassifyError::ModelUnavailable(format!(
                    "embedder returned {} rows for {} images",
                    embeddings.len(),
                    chunk.len()
                )));
            }

            entries.extend(chunk.iter().zip(embeddings).map(|(file, embedding)| {
                ReferenceEntry {
                    label: file.label.clone(),
                    embedding,
                    source: file.path.clone(),
                }
            }));
        }

        let generation = self.current.load().generation() + 1;
        let snapshot = Snapshot::from_entries(generation, entries)?;
        let report = snapshot.report();
        self.current.store(Arc::new(snapshot));

        if report.count == 0 {
            warn!(pattern, "no reference images matched; index is empty");
        }
        info!(
            count = report.count,
            generation,
            elapsed_ms = start.elapsed().as_millis() as u64,
            pattern,
            "built reference index"
        );
        Ok(report)
    }
}
