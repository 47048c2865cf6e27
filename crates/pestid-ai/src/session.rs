//! ONNX Runtime plumbing shared by the backbone and the classifier.

use std::path::Path;
use std::sync::Mutex;

use image::DynamicImage;
use ort::session::Session;
use ort::value::{Tensor, ValueType};
use pestid_core::{ClassifyError, Normalization};
use tracing::info;

use crate::preprocess::{Layout, Preprocessor};

/// A single-input image model.
///
/// `Session::run` needs exclusive access, so the session sits behind a
/// mutex; preprocessing happens before the lock is taken.
pub(crate) struct ImageSession {
    session: Mutex<Session>,
    input_name: String,
    preprocessor: Preprocessor,
    declared_width: Option<usize>,
}

impl ImageSession {
    /// Load a model, taking layout and spatial size from its declared input
    /// shape when fixed, `fallback_size` otherwise.
    pub(crate) fn load(
        model_path: &Path,
        fallback_size: u32,
        normalization: Normalization,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(model_path.exists(), "model not found: {model_path:?}");

        let session = Session::builder()?.commit_from_file(model_path)?;

        let input = session
            .inputs()
            .first()
            .ok_or_else(|| anyhow::anyhow!("model {model_path:?} declares no inputs"))?;
        let input_name = input.name().to_string();
        let (layout, declared_size) = input_geometry(input.dtype());
        let size = declared_size.unwrap_or(fallback_size);

        let declared_width = session
            .outputs()
            .first()
            .and_then(|output| output_width(output.dtype()));

        info!(
            model = %model_path.display(),
            input = %input_name,
            size,
            ?layout,
            %normalization,
            "loaded image model"
        );
        Ok(Self {
            session: Mutex::new(session),
            input_name,
            preprocessor: Preprocessor::new(size, normalization).with_layout(layout),
            declared_width,
        })
    }

    pub(crate) fn image_size(&self) -> u32 {
        self.preprocessor.size
    }

    /// Per-image output width, when the model declares a fixed one.
    pub(crate) fn declared_width(&self) -> Option<usize> {
        self.declared_width
    }

    /// Run a batch and return the first output flattened, row-major.
    pub(crate) fn run(&self, images: &[DynamicImage]) -> Result<Vec<f32>, ClassifyError> {
        let shape = self.preprocessor.batch_shape(images.len());
        let data = self.preprocessor.prepare_batch(images);
        let tensor = Tensor::from_array((shape, data.into_boxed_slice())).map_err(model_error)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ClassifyError::Internal("onnx session lock poisoned".into()))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(model_error)?;
        let (_, values) = outputs[0].try_extract_tensor::<f32>().map_err(model_error)?;
        Ok(values.to_vec())
    }
}

fn model_error(e: ort::Error) -> ClassifyError {
    ClassifyError::ModelUnavailable(e.to_string())
}

/// Layout and spatial size from a declared `[N, C, H, W]` or `[N, H, W, C]` input.
fn input_geometry(dtype: &ValueType) -> (Layout, Option<u32>) {
    let ValueType::Tensor { shape, .. } = dtype else {
        return (Layout::Nchw, None);
    };
    let dims: &[i64] = shape;
    match dims {
        [_, 3, h, _] => (Layout::Nchw, positive(*h)),
        [_, h, _, 3] => (Layout::Nhwc, positive(*h)),
        _ => (Layout::Nchw, None),
    }
}

/// Product of the non-batch output dims, if all are fixed.
///
/// `[N, 1280]` and `[N, 1280, 1, 1]` both give 1280.
fn output_width(dtype: &ValueType) -> Option<usize> {
    let ValueType::Tensor { shape, .. } = dtype else {
        return None;
    };
    let dims: &[i64] = shape;
    if dims.len() < 2 {
        return None;
    }
    dims[1..]
        .iter()
        .try_fold(1usize, |acc, &d| (d > 0).then(|| acc * d as usize))
}

fn positive(d: i64) -> Option<u32> {
    (d > 0).then_some(d as u32)
}
