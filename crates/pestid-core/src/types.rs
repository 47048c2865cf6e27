//! Shared value types passed between the index, the adapters and the service.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which scoring path produced a [`LabelScore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    /// Temperature softmax over reference-image similarities.
    Index,
    /// Secondary trained classifier.
    Classifier,
}

/// One label's probability from a single source, before fusion.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
    pub source: ScoreSource,
}

impl LabelScore {
    pub fn new(label: impl Into<String>, score: f32, source: ScoreSource) -> Self {
        Self {
            label: label.into(),
            score,
            source,
        }
    }
}

/// A fused, ranked prediction returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub probability: f32,
}

/// Outcome of a reference index build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub count: usize,
    pub labels: Vec<String>,
    pub source_paths: Vec<PathBuf>,
}

/// Read-only view of the active reference index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub count: usize,
    pub labels: Vec<String>,
    /// Increments on every successful build; 0 means never built.
    pub generation: u64,
    /// Embedding width, 0 while the index is empty.
    pub dim: usize,
}

/// Size and modification time of a model artifact on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactStat {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Load state of the secondary classifier as reported to collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ClassifierStatus {
    Unloaded,
    Loaded,
    LoadFailed(String),
}

/// Artifact introspection for the backbone and the secondary classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub backbone: Option<ArtifactStat>,
    pub classifier: Option<ArtifactStat>,
    pub labels: Option<ArtifactStat>,
    pub num_classes: usize,
    pub classifier_status: ClassifierStatus,
}
