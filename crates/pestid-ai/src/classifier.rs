//! Secondary pest classifier: a separately trained ONNX model plus `labels.json`.
//!
//! Preprocessing follows the classifier's own training resolution and
//! normalization, independent of the embedding backbone.

use std::sync::Arc;

use image::DynamicImage;
use pestid_core::{ClassifierConfig, ClassifyError, LabelScore};
use tracing::{info, warn};

use crate::labels::LabelMap;
use crate::secondary::PredictorLoader;
use crate::session::ImageSession;
use crate::traits::LabelPredictor;

pub struct OnnxClassifier {
    session: ImageSession,
    labels: LabelMap,
}

impl OnnxClassifier {
    /// Load the model and its label mapping. Both files must exist.
    pub fn load(config: &ClassifierConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(
            config.model_path.exists(),
            "classifier model not found: {:?}",
            config.model_path
        );
        anyhow::ensure!(
            config.labels_path.exists(),
            "classifier labels not found: {:?}",
            config.labels_path
        );

        let labels = LabelMap::from_file(&config.labels_path)?;
        anyhow::ensure!(!labels.is_empty(), "{:?} has no labels", config.labels_path);

        let session =
            ImageSession::load(&config.model_path, config.image_size, config.normalization)?;

        if let Some(width) = session.declared_width()
            && width != labels.len()
        {
            warn!(
                outputs = width,
                labels = labels.len(),
                "classifier output width differs from label count"
            );
        }

        info!(
            classes = labels.len(),
            model = %config.model_path.display(),
            "loaded classifier model"
        );
        Ok(Self { session, labels })
    }
}

impl LabelPredictor for OnnxClassifier {
    fn labels(&self) -> &[String] {
        self.labels.as_slice()
    }

    fn predict(&self, image: &DynamicImage) -> Result<Vec<LabelScore>, ClassifyError> {
        let raw = self.session.run(std::slice::from_ref(image))?;
        Ok(self.labels.rank(&raw))
    }
}

/// Loader for [`SecondaryClassifier::new`](crate::SecondaryClassifier::new).
pub fn onnx_loader(config: ClassifierConfig) -> PredictorLoader {
    Box::new(move || -> anyhow::Result<Arc<dyn LabelPredictor>> {
        let classifier = OnnxClassifier::load(&config)?;
        Ok(Arc::new(classifier))
    })
}
