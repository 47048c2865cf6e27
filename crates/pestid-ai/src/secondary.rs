//! Load-or-degrade wrapper around the optional secondary classifier.
//!
//! The classifier is an explicit tagged state consulted once per request.
//! A failed or absent artifact is logged once and then served as "no
//! scores" until [`SecondaryClassifier::reload`] is called.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use image::DynamicImage;
use pestid_core::{ClassifierStatus, ClassifyError, LabelScore};
use tracing::{info, warn};

use crate::traits::LabelPredictor;

/// Produces a ready predictor, or the reason it could not be loaded.
pub type PredictorLoader = Box<dyn Fn() -> anyhow::Result<Arc<dyn LabelPredictor>> + Send + Sync>;

pub enum SecondaryState {
    Unloaded,
    Loaded(Arc<dyn LabelPredictor>),
    LoadFailed(String),
}

impl fmt::Debug for SecondaryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unloaded => f.write_str("Unloaded"),
            Self::Loaded(p) => write!(f, "Loaded({} labels)", p.labels().len()),
            Self::LoadFailed(reason) => f.debug_tuple("LoadFailed").field(reason).finish(),
        }
    }
}

impl SecondaryState {
    pub fn status(&self) -> ClassifierStatus {
        match self {
            Self::Unloaded => ClassifierStatus::Unloaded,
            Self::Loaded(_) => ClassifierStatus::Loaded,
            Self::LoadFailed(reason) => ClassifierStatus::LoadFailed(reason.clone()),
        }
    }
}

pub struct SecondaryClassifier {
    loader: Option<PredictorLoader>,
    state: ArcSwap<SecondaryState>,
    /// Serializes load attempts; never held during `predict`.
    load_lock: Mutex<()>,
}

impl SecondaryClassifier {
    /// Lazily loaded on the first request.
    pub fn new(loader: PredictorLoader) -> Self {
        Self {
            loader: Some(loader),
            state: ArcSwap::from_pointee(SecondaryState::Unloaded),
            load_lock: Mutex::new(()),
        }
    }

    /// Wrap an already-loaded predictor.
    pub fn from_predictor(predictor: Arc<dyn LabelPredictor>) -> Self {
        Self {
            loader: None,
            state: ArcSwap::from_pointee(SecondaryState::Loaded(predictor)),
            load_lock: Mutex::new(()),
        }
    }

    /// No classifier configured: index-only operation.
    pub fn disabled() -> Self {
        warn!("no secondary classifier configured, serving index-only results");
        Self {
            loader: None,
            state: ArcSwap::from_pointee(SecondaryState::LoadFailed("not configured".into())),
            load_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> Arc<SecondaryState> {
        self.state.load_full()
    }

    pub fn status(&self) -> ClassifierStatus {
        self.state.load().status()
    }

    /// Current state, attempting the first load if nothing was tried yet.
    pub fn ensure_loaded(&self) -> Arc<SecondaryState> {
        let current = self.state.load_full();
        if !matches!(*current, SecondaryState::Unloaded) {
            return current;
        }
        let _guard = self.load_lock.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.state.load_full();
        if !matches!(*current, SecondaryState::Unloaded) {
            return current;
        }
        self.load_now()
    }

    /// Re-attempt the load regardless of the current state.
    pub fn reload(&self) -> ClassifierStatus {
        let _guard = self.load_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.load_now().status()
    }

    /// Scores from the classifier, or an empty list when it is unavailable.
    pub fn predict(&self, image: &DynamicImage) -> Result<Vec<LabelScore>, ClassifyError> {
        match &*self.ensure_loaded() {
            SecondaryState::Loaded(predictor) => predictor.predict(image),
            SecondaryState::Unloaded | SecondaryState::LoadFailed(_) => Ok(Vec::new()),
        }
    }

    fn load_now(&self) -> Arc<SecondaryState> {
        let Some(loader) = &self.loader else {
            return self.state.load_full();
        };
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| loader()))
            .unwrap_or_else(|_| Err(anyhow::anyhow!("classifier loader panicked")));
        let next = match attempt {
            Ok(predictor) => {
                info!(classes = predictor.labels().len(), "loaded secondary classifier");
                SecondaryState::Loaded(predictor)
            }
            Err(e) => {
                let reason = format!("{e:#}");
                warn!(%reason, "secondary classifier unavailable, serving index-only results");
                SecondaryState::LoadFailed(reason)
            }
        };
        let next = Arc::new(next);
        self.state.store(Arc::clone(&next));
        next
    }
}
