//! Score fusion: index similarities and classifier probabilities into one ranking.
//!
//! Both duplicate-label collapsing (several reference images per pest) and
//! cross-source merging go through [`merge_max`], so a single strong signal
//! represents a label and cannot be diluted or inflated by the other entries.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::debug;

use crate::types::{LabelScore, Prediction};

/// Totals below this are treated as "no mass" and fall back to uniform.
const MASS_EPSILON: f32 = 1e-12;

/// Fuses index and classifier scores into a normalized top-k list.
#[derive(Debug, Clone, Default)]
pub struct FusionEngine {
    /// Classifier scores below this are dropped before merging.
    pub classifier_min_probability: f32,
}

impl FusionEngine {
    pub fn new(classifier_min_probability: f32) -> Self {
        Self {
            classifier_min_probability,
        }
    }

    /// Merge both sources and return at most `top_k` predictions, best first.
    ///
    /// Each source contributes only its `top_k` best labels. Probabilities
    /// are renormalized over every merged label before the final
    /// truncation, so the result sums to 1 only when `top_k` covers all
    /// merged labels. An empty merge is a valid "no prediction" result.
    pub fn fuse(
        &self,
        index_scores: &[LabelScore],
        classifier_scores: &[LabelScore],
        top_k: usize,
    ) -> Vec<Prediction> {
        let mut merged = top_labels(collapse_max(index_scores), top_k);
        let index_labels = merged.len();

        let mut accepted = BTreeMap::new();
        merge_max(
            &mut accepted,
            classifier_scores
                .iter()
                .filter(|s| s.score >= self.classifier_min_probability)
                .map(|s| (s.label.as_str(), s.score)),
        );
        merge_max(&mut merged, top_labels(accepted, top_k));

        if merged.is_empty() {
            return Vec::new();
        }

        let mut ranked = renormalize(merged);
        ranked.sort_by(rank_order);
        ranked.truncate(top_k);

        debug!(
            index_labels,
            classifier_scores = classifier_scores.len(),
            returned = ranked.len(),
            "fused predictions"
        );
        ranked
    }
}

/// Fuse with default settings (no classifier threshold).
pub fn fuse(
    index_scores: &[LabelScore],
    classifier_scores: &[LabelScore],
    top_k: usize,
) -> Vec<Prediction> {
    FusionEngine::default().fuse(index_scores, classifier_scores, top_k)
}

/// Collapse scores sharing a label, keeping the maximum per label.
pub fn collapse_max(scores: &[LabelScore]) -> BTreeMap<String, f32> {
    let mut out = BTreeMap::new();
    merge_max(&mut out, scores.iter().map(|s| (s.label.as_str(), s.score)));
    out
}

/// Fold `(label, score)` pairs into `into`, keeping the per-label maximum.
///
/// Non-finite scores are ignored and negative ones clamped to zero.
pub fn merge_max<L: AsRef<str>>(
    into: &mut BTreeMap<String, f32>,
    scores: impl IntoIterator<Item = (L, f32)>,
) {
    for (label, score) in scores {
        if !score.is_finite() {
            continue;
        }
        let score = score.max(0.0);
        match into.get_mut(label.as_ref()) {
            Some(best) => *best = best.max(score),
            None => {
                into.insert(label.as_ref().to_owned(), score);
            }
        }
    }
}

/// The `k` highest-scoring labels of one collapsed source.
fn top_labels(collapsed: BTreeMap<String, f32>, k: usize) -> BTreeMap<String, f32> {
    if collapsed.len() <= k {
        return collapsed;
    }
    let mut ranked: Vec<(String, f32)> = collapsed.into_iter().collect();
    // Scores are finite here; merge_max drops the rest.
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked.into_iter().collect()
}

fn renormalize(merged: BTreeMap<String, f32>) -> Vec<Prediction> {
    let total: f32 = merged.values().sum();
    let n = merged.len() as f32;
    merged
        .into_iter()
        .map(|(label, score)| {
            let probability = if total > MASS_EPSILON {
                score / total
            } else {
                1.0 / n
            };
            Prediction { label, probability }
        })
        .collect()
}

/// Descending probability, ties by ascending label.
fn rank_order(a: &Prediction, b: &Prediction) -> Ordering {
    b.probability
        .partial_cmp(&a.probability)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.label.cmp(&b.label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::softmax_with_temperature;
    use crate::types::ScoreSource;

    fn idx(label: &str, score: f32) -> LabelScore {
        LabelScore::new(label, score, ScoreSource::Index)
    }

    fn clf(label: &str, score: f32) -> LabelScore {
        LabelScore::new(label, score, ScoreSource::Classifier)
    }

    fn sum(preds: &[Prediction]) -> f32 {
        preds.iter().map(|p| p.probability).sum()
    }

    #[test]
    fn empty_sources_yield_no_prediction() {
        assert!(fuse(&[], &[], 3).is_empty());
    }

    #[test]
    fn duplicate_labels_collapse_by_max_not_sum() {
        let probs = softmax_with_temperature(&[0.9, 0.95], 0.05);
        let scores = vec![idx("A", probs[0]), idx("A", probs[1])];

        let collapsed = collapse_max(&scores);
        assert_eq!(collapsed.len(), 1);
        assert!((collapsed["A"] - probs[1]).abs() < 1e-6);
        assert!(collapsed["A"] < probs[0] + probs[1]);
    }

    #[test]
    fn cross_source_merge_uses_max() {
        let preds = fuse(&[idx("borer", 0.4)], &[clf("borer", 0.6)], 5);
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].label, "borer");
        assert!((preds[0].probability - 1.0).abs() < 1e-6);
    }

    #[test]
    fn strong_classifier_label_outranks_weak_index_label() {
        let preds = fuse(&[idx("borer", 0.2)], &[clf("rust", 0.9)], 3);
        assert_eq!(preds[0].label, "rust");
        assert_eq!(preds[1].label, "borer");
        assert!((preds[0].probability - 0.9 / 1.1).abs() < 1e-5);
        assert!((sum(&preds) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn each_source_keeps_its_top_k_before_renormalizing() {
        let preds = fuse(
            &[idx("a", 0.4), idx("b", 0.3), idx("c", 0.2), idx("d", 0.1)],
            &[],
            3,
        );
        let labels: Vec<&str> = preds.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "b", "c"]);
        assert!((preds[0].probability - 0.4 / 0.9).abs() < 1e-6);
        assert!((preds[2].probability - 0.2 / 0.9).abs() < 1e-6);
        assert!((sum(&preds) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn renormalizes_over_both_sources_before_truncation() {
        let preds = fuse(
            &[idx("a", 0.5), idx("b", 0.3), idx("c", 0.2)],
            &[clf("x", 0.6), clf("y", 0.4)],
            2,
        );
        // Merged: a .5, b .3, x .6, y .4 (c and the rest cut per source).
        let labels: Vec<&str> = preds.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["x", "a"]);
        assert!((preds[0].probability - 0.6 / 1.8).abs() < 1e-6);
        assert!(sum(&preds) < 1.0);
    }

    #[test]
    fn duplicates_collapse_before_per_source_cut() {
        let preds = fuse(&[idx("a", 0.5), idx("a", 0.3), idx("b", 0.2)], &[], 2);
        let labels: Vec<&str> = preds.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "b"]);
        assert!((preds[0].probability - 0.5 / 0.7).abs() < 1e-6);
    }

    #[test]
    fn ties_break_by_label() {
        let preds = fuse(&[idx("zeta", 0.5), idx("alpha", 0.5)], &[], 2);
        assert_eq!(preds[0].label, "alpha");
        assert_eq!(preds[1].label, "zeta");
    }

    #[test]
    fn probabilities_non_increasing() {
        let preds = fuse(
            &[idx("a", 0.1), idx("b", 0.7), idx("c", 0.2), idx("b", 0.05)],
            &[clf("d", 0.3), clf("a", 0.6)],
            10,
        );
        for pair in preds.windows(2) {
            assert!(pair[0].probability >= pair[1].probability);
        }
        assert!((sum(&preds) - 1.0).abs() < 1e-5);
        assert!(preds.iter().all(|p| (0.0..=1.0).contains(&p.probability)));
    }

    #[test]
    fn zero_mass_falls_back_to_uniform() {
        let preds = fuse(&[idx("a", 0.0), idx("b", 0.0)], &[], 2);
        assert_eq!(preds.len(), 2);
        for p in &preds {
            assert!((p.probability - 0.5).abs() < 1e-6);
            assert!(!p.probability.is_nan());
        }
    }

    #[test]
    fn non_finite_scores_ignored() {
        let preds = fuse(&[idx("a", f32::NAN)], &[clf("b", 0.4)], 3);
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].label, "b");
    }

    #[test]
    fn classifier_threshold_drops_weak_scores() {
        let engine = FusionEngine::new(0.25);
        let preds = engine.fuse(
            &[idx("borer", 0.3)],
            &[clf("rust", 0.2), clf("mite", 0.5)],
            5,
        );
        let labels: Vec<&str> = preds.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["mite", "borer"]);
    }
}
