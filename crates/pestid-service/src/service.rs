use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use image::DynamicImage;
use pestid_ai::{
    ImageEmbedder, LabelMap, SecondaryClassifier, SecondaryState, artifact, decode_image,
};
use pestid_core::{
    BuildReport, ClassifierStatus, ClassifyError, EngineConfig, FusionEngine, IndexInfo, ModelInfo,
    Prediction,
};
use pestid_index::{ReferenceIndex, Snapshot};
use tracing::{debug, info, warn};

/// Classifies pest images against the reference index and the optional
/// secondary classifier.
///
/// All methods take `&self`; share the service behind an `Arc` to serve
/// concurrent requests.
pub struct ClassificationService {
    config: EngineConfig,
    embedder: Arc<dyn ImageEmbedder>,
    secondary: Arc<SecondaryClassifier>,
    index: Arc<ReferenceIndex>,
    fusion: FusionEngine,
    /// Set once a build-on-first-use attempt has failed; later requests
    /// serve the unbuilt index until an explicit rebuild.
    first_use_failed: AtomicBool,
}

impl ClassificationService {
    /// Assemble a service from already constructed adapters.
    ///
    /// The reference index starts unbuilt; it is built by
    /// [`rebuild_index`](Self::rebuild_index) or, when `build_on_first_use`
    /// is set, by the first classification.
    pub fn new(
        config: EngineConfig,
        embedder: Arc<dyn ImageEmbedder>,
        secondary: SecondaryClassifier,
    ) -> Result<Self, ClassifyError> {
        config.validate()?;
        let index = ReferenceIndex::new(Arc::clone(&embedder), config.embed_batch_size);
        let fusion = FusionEngine::new(config.classifier_min_probability);

        info!(
            dim = embedder.dim(),
            reference_glob = %config.reference_glob,
            temperature = config.temperature,
            "classification service ready"
        );
        Ok(Self {
            config,
            embedder,
            secondary: Arc::new(secondary),
            index: Arc::new(index),
            fusion,
            first_use_failed: AtomicBool::new(false),
        })
    }

    /// Load the ONNX backbone and, if configured, register the classifier
    /// for lazy loading. A backbone that cannot be loaded is fatal.
    #[cfg(feature = "onnx")]
    pub fn from_config(config: EngineConfig) -> Result<Self, ClassifyError> {
        config.validate()?;
        let embedder = pestid_ai::OnnxEmbedder::load(&config.backbone)
            .map_err(|e| ClassifyError::ModelUnavailable(format!("{e:#}")))?;
        let secondary = match &config.classifier {
            Some(classifier) => {
                SecondaryClassifier::new(pestid_ai::onnx_loader(classifier.clone()))
            }
            None => SecondaryClassifier::disabled(),
        };
        Self::new(config, Arc::new(embedder), secondary)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ranked predictions for `image`, at most `top_k` (default from config).
    ///
    /// An empty result means neither the index nor the classifier had
    /// anything to offer; it is not an error.
    pub async fn classify(
        &self,
        image: DynamicImage,
        top_k: Option<usize>,
    ) -> Result<Vec<Prediction>, ClassifyError> {
        let top_k = self.resolve_top_k(top_k)?;
        let start = Instant::now();
        let snapshot = self.snapshot().await?;
        let image = Arc::new(image);

        let index_scores = {
            let embedder = Arc::clone(&self.embedder);
            let snapshot = Arc::clone(&snapshot);
            let image = Arc::clone(&image);
            let temperature = self.config.temperature;
            async move {
                if snapshot.is_empty() {
                    Ok(Vec::new())
                } else {
                    blocking(move || {
                        let query = embedder.embed(&image)?;
                        snapshot.scores(&query, temperature)
                    })
                    .await
                }
            }
        };
        let classifier_scores = {
            let secondary = Arc::clone(&self.secondary);
            let image = Arc::clone(&image);
            blocking(move || secondary.predict(&image))
        };

        let (index_scores, classifier_scores) = tokio::join!(index_scores, classifier_scores);
        let (index_scores, classifier_scores) = (index_scores?, classifier_scores?);

        let predictions = self.fusion.fuse(&index_scores, &classifier_scores, top_k);
        debug!(
            generation = snapshot.generation(),
            index_scores = index_scores.len(),
            classifier_scores = classifier_scores.len(),
            returned = predictions.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "classified image"
        );
        Ok(predictions)
    }

    /// Decode `bytes` (PNG, JPEG or WebP) and classify the image.
    pub async fn classify_bytes(
        &self,
        bytes: Vec<u8>,
        top_k: Option<usize>,
    ) -> Result<Vec<Prediction>, ClassifyError> {
        let top_k = self.resolve_top_k(top_k)?;
        let image = blocking(move || decode_image(&bytes)).await?;
        self.classify(image, Some(top_k)).await
    }

    /// Rebuild the reference index from the configured glob.
    pub async fn rebuild_index(&self) -> Result<BuildReport, ClassifyError> {
        let index = Arc::clone(&self.index);
        let pattern = self.config.reference_glob.clone();
        blocking(move || index.build(&pattern)).await
    }

    /// Build the index if it was never built, then describe it.
    pub async fn ensure_index(&self) -> Result<IndexInfo, ClassifyError> {
        let index = Arc::clone(&self.index);
        let pattern = self.config.reference_glob.clone();
        let snapshot = blocking(move || index.ensure_built(&pattern)).await?;
        Ok(snapshot.info())
    }

    pub fn index_info(&self) -> IndexInfo {
        self.index.info()
    }

    /// Artifact paths, sizes and timestamps plus the classifier load state.
    ///
    /// Does not trigger a classifier load.
    pub fn model_info(&self) -> ModelInfo {
        let state = self.secondary.state();
        let classifier = self.config.classifier.as_ref();

        let num_classes = match &*state {
            SecondaryState::Loaded(predictor) => predictor.labels().len(),
            SecondaryState::Unloaded | SecondaryState::LoadFailed(_) => classifier
                .and_then(|c| LabelMap::from_file(&c.labels_path).ok())
                .map_or(0, |labels| labels.len()),
        };

        ModelInfo {
            backbone: artifact::stat(&self.config.backbone.model_path),
            classifier: classifier.and_then(|c| artifact::stat(&c.model_path)),
            labels: classifier.and_then(|c| artifact::stat(&c.labels_path)),
            num_classes,
            classifier_status: state.status(),
        }
    }

    /// Re-attempt loading the secondary classifier.
    pub async fn reload_classifier(&self) -> Result<ClassifierStatus, ClassifyError> {
        let secondary = Arc::clone(&self.secondary);
        blocking(move || Ok(secondary.reload())).await
    }

    fn resolve_top_k(&self, top_k: Option<usize>) -> Result<usize, ClassifyError> {
        match top_k.unwrap_or(self.config.default_top_k) {
            0 => Err(ClassifyError::InvalidInput(
                "top_k must be at least 1".into(),
            )),
            k => Ok(k),
        }
    }

    /// The snapshot to serve this request, building it on first use.
    ///
    /// A failed first-use build is logged once and the unbuilt index is
    /// served, so the index contributes nothing until `rebuild_index`
    /// succeeds.
    async fn snapshot(&self) -> Result<Arc<Snapshot>, ClassifyError> {
        let current = self.index.current();
        if current.generation() > 0
            || !self.config.build_on_first_use
            || self.first_use_failed.load(Ordering::Acquire)
        {
            return Ok(current);
        }
        info!("reference index not built yet, building on first use");
        let index = Arc::clone(&self.index);
        let pattern = self.config.reference_glob.clone();
        match blocking(move || index.ensure_built(&pattern)).await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                if !self.first_use_failed.swap(true, Ordering::AcqRel) {
                    warn!(error = %e, "first-use index build failed, serving without the index");
                }
                Ok(self.index.current())
            }
        }
    }
}

/// Run CPU-bound work on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ClassifyError>
where
    F: FnOnce() -> Result<T, ClassifyError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ClassifyError::Internal(format!("inference worker failed: {e}")))?
}
