pub mod config;
pub mod error;
pub mod fusion;
pub mod math;
pub mod types;

pub use config::{ClassifierConfig, EngineConfig, ModelConfig, Normalization};
pub use error::ClassifyError;
pub use fusion::{FusionEngine, fuse};
pub use types::{
    ArtifactStat, BuildReport, ClassifierStatus, IndexInfo, LabelScore, ModelInfo, Prediction,
    ScoreSource,
};
