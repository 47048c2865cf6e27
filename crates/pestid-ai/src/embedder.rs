//! ONNX Runtime feature backbone for reference and query embeddings.
//!
//! Expects a frozen image backbone exported with global average pooling
//! (e.g. MobileNetV2 without its top, 1280 dimensions). Outputs are
//! L2-normalized so dot products are cosine similarities.

use image::DynamicImage;
use pestid_core::math::l2_normalize;
use pestid_core::{ClassifyError, ModelConfig};
use tracing::info;

use crate::session::ImageSession;
use crate::traits::ImageEmbedder;

pub struct OnnxEmbedder {
    session: ImageSession,
    dim: usize,
}

impl OnnxEmbedder {
    /// Load the backbone described by `config`.
    ///
    /// When the model's output width is dynamic, a blank probe image is run
    /// once to discover it.
    pub fn load(config: &ModelConfig) -> anyhow::Result<Self> {
        let session =
            ImageSession::load(&config.model_path, config.image_size, config.normalization)?;

        let dim = match session.declared_width() {
            Some(dim) => dim,
            None => {
                let size = session.image_size();
                session.run(&[DynamicImage::new_rgb8(size, size)])?.len()
            }
        };
        anyhow::ensure!(
            dim > 0,
            "backbone {:?} produced an empty embedding",
            config.model_path
        );

        info!(dim, model = %config.model_path.display(), "loaded embedding backbone");
        Ok(Self { session, dim })
    }
}

impl ImageEmbedder for OnnxEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, images: &[DynamicImage]) -> Result<Vec<Vec<f32>>, ClassifyError> {
        if images.is_empty() {
            return Ok(vec![]);
        }

        let values = self.session.run(images)?;
        if values.len() != images.len() * self.dim {
            return Err(ClassifyError::ModelUnavailable(format!(
                "unexpected backbone output: {} values for {} images of dim {}",
                values.len(),
                images.len(),
                self.dim
            )));
        }

        Ok(values
            .chunks(self.dim)
            .map(|row| {
                let mut v = row.to_vec();
                l2_normalize(&mut v);
                v
            })
            .collect())
    }
}
