//! Engine configuration.
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or no file) is a valid configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ClassifyError;

/// Pixel normalization applied after resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// `x / 127.5 - 1`, range [-1, 1] (MobileNetV2 `preprocess_input`).
    #[default]
    Symmetric,
    /// `x / 255`, range [0, 1].
    Unit,
    /// ImageNet channel mean/std after scaling to [0, 1].
    Imagenet,
}

impl FromStr for Normalization {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "symmetric" | "mobilenet" => Ok(Self::Symmetric),
            "unit" => Ok(Self::Unit),
            "imagenet" => Ok(Self::Imagenet),
            other => Err(ClassifyError::Config(format!(
                "unknown normalization '{other}' (expected symmetric, unit or imagenet)"
            ))),
        }
    }
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Symmetric => "symmetric",
            Self::Unit => "unit",
            Self::Imagenet => "imagenet",
        })
    }
}

/// Feature backbone used for reference and query embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model_path: PathBuf,
    /// Used when the model's declared input size is dynamic.
    pub image_size: u32,
    pub normalization: Normalization,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/backbone/model.onnx"),
            image_size: 224,
            normalization: Normalization::Symmetric,
        }
    }
}

/// Optional secondary classifier artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    pub image_size: u32,
    pub normalization: Normalization,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/classifier/model.onnx"),
            labels_path: PathBuf::from("models/classifier/labels.json"),
            image_size: 224,
            normalization: Normalization::Unit,
        }
    }
}

/// Top-level configuration for the classification engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Glob of reference images; label = file stem.
    pub reference_glob: String,
    /// Softmax temperature for reference similarities. Not calibrated;
    /// validate against labelled data before relying on it.
    pub temperature: f32,
    pub default_top_k: usize,
    pub embed_batch_size: usize,
    /// Build the index on the first classification if it was never built.
    pub build_on_first_use: bool,
    /// Classifier scores below this are ignored during fusion.
    pub classifier_min_probability: f32,
    pub backbone: ModelConfig,
    pub classifier: Option<ClassifierConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reference_glob: "static/*.jpg".to_string(),
            temperature: 0.05,
            default_top_k: 3,
            embed_batch_size: 32,
            build_on_first_use: true,
            classifier_min_probability: 0.0,
            backbone: ModelConfig::default(),
            classifier: None,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ClassifyError> {
        let config: Self =
            toml::from_str(s).map_err(|e| ClassifyError::Config(format!("parse toml: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ClassifyError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ClassifyError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ClassifyError> {
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(ClassifyError::Config(format!(
                "temperature must be a positive number, got {}",
                self.temperature
            )));
        }
        if self.default_top_k == 0 {
            return Err(ClassifyError::Config(
                "default_top_k must be at least 1".into(),
            ));
        }
        if self.embed_batch_size == 0 {
            return Err(ClassifyError::Config(
                "embed_batch_size must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.classifier_min_probability) {
            return Err(ClassifyError::Config(format!(
                "classifier_min_probability must be within [0, 1], got {}",
                self.classifier_min_probability
            )));
        }
        if self.backbone.image_size == 0 {
            return Err(ClassifyError::Config(
                "backbone.image_size must be non-zero".into(),
            ));
        }
        if let Some(clf) = &self.classifier
            && clf.image_size == 0
        {
            return Err(ClassifyError::Config(
                "classifier.image_size must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.reference_glob, "static/*.jpg");
        assert_eq!(config.temperature, 0.05);
        assert_eq!(config.default_top_k, 3);
        assert!(config.classifier.is_none());
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn parse_full_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            reference_glob = "refs/*.png"
            temperature = 0.1
            default_top_k = 5

            [backbone]
            model_path = "models/mnv2/model.onnx"
            normalization = "imagenet"

            [classifier]
            model_path = "models/durian/model.onnx"
            labels_path = "models/durian/labels.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.reference_glob, "refs/*.png");
        assert_eq!(config.default_top_k, 5);
        assert_eq!(config.backbone.normalization, Normalization::Imagenet);
        assert_eq!(config.backbone.image_size, 224);
        let clf = config.classifier.unwrap();
        assert_eq!(clf.labels_path, PathBuf::from("models/durian/labels.json"));
        assert_eq!(clf.normalization, Normalization::Unit);
    }

    #[test]
    fn rejects_non_positive_temperature() {
        let err = EngineConfig::from_toml_str("temperature = 0.0").unwrap_err();
        assert!(matches!(err, ClassifyError::Config(_)));

        let config = EngineConfig {
            temperature: f32::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let config = EngineConfig {
            classifier_min_probability: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn normalization_from_str() {
        assert_eq!("unit".parse::<Normalization>().unwrap(), Normalization::Unit);
        assert_eq!(
            "MobileNet".parse::<Normalization>().unwrap(),
            Normalization::Symmetric
        );
        assert!("zscore".parse::<Normalization>().is_err());
        assert_eq!(Normalization::Imagenet.to_string(), "imagenet");
    }
}
