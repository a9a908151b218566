// ============================================================
// Layer 3 — Image and Batch Types
// ============================================================
// Everything the data pipeline hands to the model layer is
// float32 in NHWC order (batch, height, width, channels),
// matching how the images are stored on disk. The ML layer
// permutes to NCHW when it builds tensors.

use serde::{Deserialize, Serialize};

/// Number of colour channels. Images are always RGB.
pub const CHANNELS: usize = 3;

/// Which half of the dataset a sampler is serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Random patches, augmented, `batch_size` per item
    Train,
    /// Full images, one per item
    Eval,
}

/// A single HWC float image, e.g. one model prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatImage {
    pub height: usize,
    pub width:  usize,
    /// Row-major HWC values, `height * width * CHANNELS` long
    pub data:   Vec<f32>,
}

impl FloatImage {
    pub fn new(height: usize, width: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), height * width * CHANNELS);
        Self { height, width, data }
    }

    /// Value at (row, col, channel)
    #[inline]
    pub fn at(&self, y: usize, x: usize, c: usize) -> f32 {
        self.data[(y * self.width + x) * CHANNELS + c]
    }
}

/// A stack of low-res / high-res pairs in NHWC layout.
///
/// Training batches hold `batch_size` patches of identical shape;
/// eval batches hold exactly one full image pair.
#[derive(Debug, Clone)]
pub struct ImageBatch {
    pub lr:      Vec<f32>,
    pub lr_dims: [usize; 4],
    pub hr:      Vec<f32>,
    pub hr_dims: [usize; 4],
}

impl ImageBatch {
    /// Number of pairs in the batch
    pub fn len(&self) -> usize {
        self.lr_dims[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split the high-res half back into per-sample images.
    pub fn hr_images(&self) -> Vec<FloatImage> {
        split_images(&self.hr, self.hr_dims)
    }
}

/// Cut an NHWC buffer into `n` FloatImages.
pub fn split_images(data: &[f32], dims: [usize; 4]) -> Vec<FloatImage> {
    let [n, h, w, c] = dims;
    let per_image = h * w * c;
    (0..n)
        .map(|i| FloatImage::new(h, w, data[i * per_image..(i + 1) * per_image].to_vec()))
        .collect()
}
