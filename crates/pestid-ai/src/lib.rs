//! Inference adapters: image preprocessing, the embedding backbone and the
//! optional secondary classifier.

pub mod artifact;
pub mod labels;
pub mod preprocess;
pub mod secondary;
mod traits;

pub use labels::LabelMap;
pub use preprocess::{Layout, Preprocessor, decode_image, open_image};
pub use secondary::{PredictorLoader, SecondaryClassifier, SecondaryState};
pub use traits::{ImageEmbedder, LabelPredictor};

#[cfg(feature = "onnx")]
mod session;

#[cfg(feature = "onnx")]
mod embedder;
#[cfg(feature = "onnx")]
pub use embedder::OnnxEmbedder;

#[cfg(feature = "onnx")]
mod classifier;
#[cfg(feature = "onnx")]
pub use classifier::{OnnxClassifier, onnx_loader};
