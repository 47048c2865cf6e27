use image::DynamicImage;
use pestid_core::{ClassifyError, LabelScore};

/// Image → unit-normalized feature vector.
///
/// Implementations must be deterministic for identical pixels, and
/// [`embed`](Self::embed) must agree with the matching row of
/// [`embed_batch`](Self::embed_batch) up to numerical precision.
pub trait ImageEmbedder: Send + Sync {
    /// Embedding dimensionality.
    fn dim(&self) -> usize;

    /// Embed a batch of images, returning one normalized vector per input.
    fn embed_batch(&self, images: &[DynamicImage]) -> Result<Vec<Vec<f32>>, ClassifyError>;

    /// Embed a single image.
    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>, ClassifyError> {
        self.embed_batch(std::slice::from_ref(image))?
            .into_iter()
            .next()
            .ok_or_else(|| ClassifyError::ModelUnavailable("embedder returned no rows".into()))
    }
}

/// Image → probability distribution over a closed label vocabulary.
pub trait LabelPredictor: Send + Sync {
    /// The classifier's vocabulary in output-index order.
    fn labels(&self) -> &[String];

    /// Scores for every label, summing to 1, best first.
    fn predict(&self, image: &DynamicImage) -> Result<Vec<LabelScore>, ClassifyError>;
}
