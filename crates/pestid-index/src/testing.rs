//! Deterministic stand-in embedder and image fixtures.

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender};

use image::{DynamicImage, Rgb, RgbImage};
use pestid_ai::ImageEmbedder;
use pestid_core::ClassifyError;
use pestid_core::math::l2_normalize;

/// Embeds an image as its normalized mean RGB colour.
#[derive(Default)]
pub struct MeanColor {
    pub batches: AtomicUsize,
}

pub fn mean_color(image: &DynamicImage) -> Vec<f32> {
    let rgb = image.to_rgb8();
    let n = (rgb.width() * rgb.height()).max(1) as f32;
    let mut v = [0.0f32; 3];
    for px in rgb.pixels() {
        for (acc, c) in v.iter_mut().zip(px.0) {
            *acc += c as f32 / 255.0;
        }
    }
    let mut v: Vec<f32> = v.iter().map(|x| x / n).collect();
    l2_normalize(&mut v);
    v
}

impl ImageEmbedder for MeanColor {
    fn dim(&self) -> usize {
        3
    }

    fn embed_batch(&self, images: &[DynamicImage]) -> Result<Vec<Vec<f32>>, ClassifyError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(images.iter().map(mean_color).collect())
    }
}

/// Mean-colour embedder that parks inside `embed_batch` until released.
pub struct Gated {
    pub entered: Mutex<Sender<()>>,
    pub release: Mutex<Receiver<()>>,
}

impl ImageEmbedder for Gated {
    fn dim(&self) -> usize {
        3
    }

    fn embed_batch(&self, images: &[DynamicImage]) -> Result<Vec<Vec<f32>>, ClassifyError> {
        if let Ok(tx) = self.entered.lock() {
            let _ = tx.send(());
        }
        if let Ok(rx) = self.release.lock() {
            let _ = rx.recv();
        }
        Ok(images.iter().map(mean_color).collect())
    }
}

pub fn write_png(dir: &Path, name: &str, rgb: [u8; 3]) {
    RgbImage::from_pixel(16, 16, Rgb(rgb))
        .save(dir.join(name))
        .unwrap();
}

pub fn pattern(dir: &Path, ext: &str) -> String {
    format!("{}/*.{ext}", dir.display())
}
