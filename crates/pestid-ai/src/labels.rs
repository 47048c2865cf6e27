//! Index → label mapping shipped next to a trained classifier.
//!
//! Two on-disk shapes are accepted for `labels.json`:
//! - an array, where the position is the output index: `["helopeltis", "thrips"]`
//! - an object keyed by index: `{"0": "helopeltis", "1": "thrips"}`
//!
//! Indices with no entry are reported as `class_{i}`.

use std::cmp::Ordering;
use std::path::Path;

use anyhow::Context;
use pestid_core::math::{is_distribution, softmax};
use pestid_core::{LabelScore, ScoreSource};
use serde_json::Value;

/// Upper bound on object-form indices; no pest classifier has more outputs.
const MAX_CLASSES: usize = 100_000;

/// Ordered labels for a classifier's output vector.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelMap {
    labels: Vec<String>,
}

impl LabelMap {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Parse either accepted JSON shape.
    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        let value: Value = serde_json::from_str(s).context("parse labels json")?;
        match value {
            Value::Array(items) => {
                let labels = items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| match v {
                        Value::String(s) => Ok(s),
                        other => anyhow::bail!("label {i} is not a string: {other}"),
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?;
                Ok(Self { labels })
            }
            Value::Object(map) => {
                let mut pairs = Vec::with_capacity(map.len());
                for (key, v) in map {
                    let idx: usize = key
                        .trim()
                        .parse()
                        .with_context(|| format!("label key '{key}' is not an index"))?;
                    anyhow::ensure!(
                        idx < MAX_CLASSES,
                        "label index {idx} exceeds the supported {MAX_CLASSES} classes"
                    );
                    let Value::String(label) = v else {
                        anyhow::bail!("label for index {idx} is not a string");
                    };
                    pairs.push((idx, label));
                }
                let len = pairs.iter().map(|(i, _)| i + 1).max().unwrap_or(0);
                let mut labels: Vec<String> = (0..len).map(placeholder).collect();
                for (idx, label) in pairs {
                    labels[idx] = label;
                }
                Ok(Self { labels })
            }
            _ => anyhow::bail!("labels json must be an array or an object"),
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read labels {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("labels {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }

    /// Label for output index `i`, falling back to `class_{i}`.
    pub fn label(&self, i: usize) -> String {
        self.labels.get(i).cloned().unwrap_or_else(|| placeholder(i))
    }

    /// Turn one raw output row into labelled scores, best first.
    ///
    /// Rows that are not already a probability distribution are treated as
    /// logits and passed through the stable softmax.
    pub fn rank(&self, raw: &[f32]) -> Vec<LabelScore> {
        let probs = if is_distribution(raw) {
            raw.to_vec()
        } else {
            softmax(raw)
        };
        let mut scores: Vec<LabelScore> = probs
            .into_iter()
            .enumerate()
            .map(|(i, p)| LabelScore::new(self.label(i), p, ScoreSource::Classifier))
            .collect();
        scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scores
    }
}

fn placeholder(i: usize) -> String {
    format!("class_{i}")
}
