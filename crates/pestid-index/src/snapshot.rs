//! Immutable reference index snapshot.

use std::path::PathBuf;

use pestid_core::math::{dot, softmax_with_temperature};
use pestid_core::{BuildReport, ClassifyError, IndexInfo, LabelScore, ScoreSource};

/// One labelled reference embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceEntry {
    pub label: String,
    /// L2-unit-normalized.
    pub embedding: Vec<f32>,
    pub source: PathBuf,
}

/// A fully built index: M rows of D-dimensional unit vectors.
///
/// Never mutated after construction; a rebuild produces a new snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    generation: u64,
    dim: usize,
    labels: Vec<String>,
    sources: Vec<PathBuf>,
    /// Row-major M×D.
    matrix: Vec<f32>,
}

impl Snapshot {
    /// The never-built index served at startup.
    pub fn empty() -> Self {
        Self {
            generation: 0,
            dim: 0,
            labels: Vec::new(),
            sources: Vec::new(),
            matrix: Vec::new(),
        }
    }

    /// Assemble a snapshot, rejecting rows of differing dimension.
    pub fn from_entries(
        generation: u64,
        entries: Vec<ReferenceEntry>,
    ) -> Result<Self, ClassifyError> {
        let dim = entries.first().map(|e| e.embedding.len()).unwrap_or(0);
        if dim == 0 && !entries.is_empty() {
            return Err(ClassifyError::ModelUnavailable(
                "embedder produced zero-length embeddings".into(),
            ));
        }
        let mut labels = Vec::with_capacity(entries.len());
        let mut sources = Vec::with_capacity(entries.len());
        let mut matrix = Vec::with_capacity(entries.len() * dim);

        for entry in entries {
            if entry.embedding.len() != dim {
                return Err(ClassifyError::DimensionMismatch {
                    expected: dim,
                    actual: entry.embedding.len(),
                });
            }
            matrix.extend_from_slice(&entry.embedding);
            labels.push(entry.label);
            sources.push(entry.source);
        }

        Ok(Self {
            generation,
            dim,
            labels,
            sources,
            matrix,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Embedding row `i`.
    pub fn embedding(&self, i: usize) -> Option<&[f32]> {
        (i < self.len()).then(|| &self.matrix[i * self.dim..(i + 1) * self.dim])
    }

    /// Cosine similarity of `query` (a unit vector) to every row.
    pub fn similarities(&self, query: &[f32]) -> Result<Vec<f32>, ClassifyError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dim {
            return Err(ClassifyError::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }
        Ok(self
            .matrix
            .chunks(self.dim)
            .map(|row| dot(row, query))
            .collect())
    }

    /// Temperature-softmax probability for every row, duplicates included.
    ///
    /// Collapsing rows that share a label is left to the fusion step.
    pub fn scores(
        &self,
        query: &[f32],
        temperature: f32,
    ) -> Result<Vec<LabelScore>, ClassifyError> {
        let sims = self.similarities(query)?;
        let probs = softmax_with_temperature(&sims, temperature);
        Ok(self
            .labels
            .iter()
            .zip(probs)
            .map(|(label, p)| LabelScore::new(label.clone(), p, ScoreSource::Index))
            .collect())
    }

    pub fn info(&self) -> IndexInfo {
        IndexInfo {
            count: self.len(),
            labels: self.labels.clone(),
            generation: self.generation,
            dim: self.dim,
        }
    }

    pub fn report(&self) -> BuildReport {
        BuildReport {
            count: self.len(),
            labels: self.labels.clone(),
            source_paths: self.sources.clone(),
        }
    }
}
