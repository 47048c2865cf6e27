//! Numeric helpers shared by the index and the adapters.
//!
//! Every normalisation carries an epsilon floor so degenerate inputs
//! (all-zero features, all-equal scores) never produce NaN.

/// Floor added to vector norms before division.
pub const NORM_EPSILON: f32 = 1e-10;

/// Floor added to softmax denominators.
pub const SOFTMAX_EPSILON: f32 = 1e-12;

/// Dot product. For unit vectors this is the cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// L2-normalize a vector in place: `v / (||v|| + eps)`.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm + NORM_EPSILON;
    for x in v.iter_mut() {
        *x /= denom;
    }
}

/// Numerically stable softmax: subtract the maximum before exponentiating.
///
/// Returns an empty vector for empty input.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![0.0; logits.len()];
    }
    let exps: Vec<f32> = logits.iter().map(|&z| (z - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / (sum + SOFTMAX_EPSILON)).collect()
}

/// Temperature-scaled softmax: `softmax(scores / temperature)`.
///
/// Smaller temperatures sharpen the distribution toward the top score.
pub fn softmax_with_temperature(scores: &[f32], temperature: f32) -> Vec<f32> {
    let scaled: Vec<f32> = scores.iter().map(|s| s / temperature).collect();
    softmax(&scaled)
}

/// Whether `values` already look like a probability distribution.
pub fn is_distribution(values: &[f32]) -> bool {
    if values.is_empty() {
        return false;
    }
    let in_range = values.iter().all(|v| (0.0..=1.0).contains(v));
    let sum: f32 = values.iter().sum();
    in_range && (sum - 1.0).abs() < 1e-3
}
