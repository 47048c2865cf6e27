//! pestid: classify pest images against labelled reference photos.

mod display;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pestid_core::{ClassifierConfig, EngineConfig, Normalization};
use pestid_service::ClassificationService;
use tracing_subscriber::EnvFilter;

use crate::display::Format;

/// Pest image classification
#[derive(Parser, Debug)]
#[command(name = "pestid", version, about)]
struct Args {
    /// TOML configuration file; flags and environment override it
    #[arg(short, long, env = "PESTID_CONFIG")]
    config: Option<PathBuf>,

    /// Glob of reference images, labelled by file stem
    #[arg(long, env = "PESTID_REFERENCE_GLOB")]
    reference_glob: Option<String>,

    /// Softmax temperature for reference similarities
    #[arg(long, env = "PESTID_TEMPERATURE")]
    temperature: Option<f32>,

    /// Backbone input resolution when the model does not fix it
    #[arg(long, env = "PESTID_IMAGE_SIZE")]
    image_size: Option<u32>,

    /// Backbone pixel normalization (symmetric, unit, imagenet)
    #[arg(long, env = "PESTID_NORMALIZATION")]
    normalization: Option<Normalization>,

    /// Backbone ONNX model
    #[arg(long, env = "PESTID_BACKBONE")]
    backbone: Option<PathBuf>,

    /// Secondary classifier ONNX model
    #[arg(long, env = "PESTID_CLASSIFIER_MODEL")]
    classifier_model: Option<PathBuf>,

    /// Secondary classifier labels.json
    #[arg(long, env = "PESTID_CLASSIFIER_LABELS")]
    classifier_labels: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Json, global = true)]
    format: Format,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify an image file
    Classify {
        image: PathBuf,
        /// Number of predictions to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Rebuild the reference index
    Reindex,

    /// Build the reference index if needed and describe it
    Info,

    /// Show model artifacts and classifier state
    ModelInfo,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;
    tracing::info!("pestid v{}", env!("CARGO_PKG_VERSION"));

    let service = ClassificationService::from_config(config)?;

    match args.command {
        Command::Classify { image, top_k } => {
            let bytes =
                std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;
            let predictions = service.classify_bytes(bytes, top_k).await?;
            display::emit(&predictions, args.format, |p| display::predictions(p))?;
        }
        Command::Reindex => {
            let report = service.rebuild_index().await?;
            display::emit(&report, args.format, display::build_report)?;
        }
        Command::Info => {
            let info = service.ensure_index().await?;
            display::emit(&info, args.format, display::index_info)?;
        }
        Command::ModelInfo => {
            service.reload_classifier().await?;
            let info = service.model_info();
            display::emit(&info, args.format, display::model_info)?;
        }
    }

    Ok(())
}

/// Configuration file (or defaults) with command-line overrides applied.
///
/// Without an explicit classifier, the default artifact location is used
/// when a model is present there.
fn build_config(args: &Args) -> anyhow::Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    if let Some(glob) = &args.reference_glob {
        config.reference_glob = glob.clone();
    }
    if let Some(temperature) = args.temperature {
        config.temperature = temperature;
    }
    if let Some(size) = args.image_size {
        config.backbone.image_size = size;
    }
    if let Some(normalization) = args.normalization {
        config.backbone.normalization = normalization;
    }
    if let Some(path) = &args.backbone {
        config.backbone.model_path = path.clone();
    }

    if args.classifier_model.is_some() || args.classifier_labels.is_some() {
        let classifier = config.classifier.get_or_insert_with(ClassifierConfig::default);
        if let Some(path) = &args.classifier_model {
            classifier.model_path = path.clone();
        }
        if let Some(path) = &args.classifier_labels {
            classifier.labels_path = path.clone();
        }
    } else if config.classifier.is_none() {
        let default = ClassifierConfig::default();
        if default.model_path.exists() {
            config.classifier = Some(default);
        }
    }

    config.validate()?;
    Ok(config)
}
