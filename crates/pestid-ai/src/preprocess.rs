//! Image decoding and tensor preparation.
//!
//! Single-image and batched inputs share [`Preprocessor::prepare`], so a
//! batch row is bit-identical to the same image prepared on its own.

use std::path::Path;

use image::DynamicImage;
use image::imageops::FilterType;
use pestid_core::{ClassifyError, Normalization};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Fixed resampling filter; never randomised.
const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

/// Memory layout of the model's image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// `[batch, channels, height, width]` (PyTorch exports).
    #[default]
    Nchw,
    /// `[batch, height, width, channels]` (Keras exports).
    Nhwc,
}

/// Resize + normalize images into a flat `f32` tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessor {
    pub size: u32,
    pub normalization: Normalization,
    pub layout: Layout,
}

impl Preprocessor {
    pub fn new(size: u32, normalization: Normalization) -> Self {
        Self {
            size,
            normalization,
            layout: Layout::Nchw,
        }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Number of `f32` values produced per image.
    pub fn values_per_image(&self) -> usize {
        3 * (self.size as usize) * (self.size as usize)
    }

    /// Tensor shape for a batch of `n` images.
    pub fn batch_shape(&self, n: usize) -> [i64; 4] {
        let s = self.size as i64;
        match self.layout {
            Layout::Nchw => [n as i64, 3, s, s],
            Layout::Nhwc => [n as i64, s, s, 3],
        }
    }

    /// Convert one image to RGB, resize it exactly and normalize its pixels.
    pub fn prepare(&self, image: &DynamicImage) -> Vec<f32> {
        let rgb = image
            .resize_exact(self.size, self.size, RESIZE_FILTER)
            .to_rgb8();
        let plane = (self.size as usize) * (self.size as usize);
        let mut out = vec![0.0f32; 3 * plane];

        for (i, pixel) in rgb.pixels().enumerate() {
            for c in 0..3 {
                let v = self.normalize(pixel[c], c);
                match self.layout {
                    Layout::Nchw => out[c * plane + i] = v,
                    Layout::Nhwc => out[i * 3 + c] = v,
                }
            }
        }
        out
    }

    /// Prepare a batch as one contiguous buffer in [`batch_shape`](Self::batch_shape) order.
    pub fn prepare_batch(&self, images: &[DynamicImage]) -> Vec<f32> {
        let mut out = Vec::with_capacity(images.len() * self.values_per_image());
        for image in images {
            out.extend(self.prepare(image));
        }
        out
    }

    fn normalize(&self, value: u8, channel: usize) -> f32 {
        let v = value as f32;
        match self.normalization {
            Normalization::Symmetric => v / 127.5 - 1.0,
            Normalization::Unit => v / 255.0,
            Normalization::Imagenet => (v / 255.0 - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel],
        }
    }
}

/// Decode an in-memory image (any format the `image` crate was built with).
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ClassifyError> {
    image::load_from_memory(bytes)
        .map_err(|e| ClassifyError::InvalidInput(format!("decode image: {e}")))
}

/// Open and decode an image file.
pub fn open_image(path: &Path) -> Result<DynamicImage, ClassifyError> {
    image::open(path)
        .map_err(|e| ClassifyError::InvalidInput(format!("read {}: {e}", path.display())))
}
