// ============================================================
// Layer 4 — SR Batcher
// ============================================================
// Converts an ImageBatch (NHWC float buffers) into Burn
// tensors in the NCHW layout the convolutions expect, and
// turns model output back into per-sample HWC images.
//
//   [N, H, W, C] ──permute(0,3,1,2)──▶ [N, C, H, W]
//
// B is the Burn Backend (e.g. Wgpu, NdArray), generic so the
// same batcher works for training and validation devices.
//
// Reference: Burn Book §4 (Batcher)

use anyhow::{anyhow, Result};
use burn::{prelude::*, tensor::TensorData};

use crate::domain::image::{split_images, FloatImage, ImageBatch};

// ─── SrBatch ──────────────────────────────────────────────────────────────────
/// A batch ready for the forward pass.
#[derive(Debug, Clone)]
pub struct SrBatch<B: Backend> {
    /// Low-res input — shape: [batch, 3, h, w]
    pub lr: Tensor<B, 4>,

    /// High-res target — shape: [batch, 3, h*scale, w*scale]
    pub hr: Tensor<B, 4>,
}

// ─── SrBatcher ────────────────────────────────────────────────────────────────
/// Holds the target device so tensors are created on it.
#[derive(Clone, Debug)]
pub struct SrBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> SrBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    pub fn batch(&self, item: &ImageBatch) -> SrBatch<B> {
        SrBatch {
            lr: self.nchw(&item.lr, item.lr_dims),
            hr: self.nchw(&item.hr, item.hr_dims),
        }
    }

    fn nchw(&self, data: &[f32], dims: [usize; 4]) -> Tensor<B, 4> {
        Tensor::<B, 4>::from_data(TensorData::new(data.to_vec(), dims), &self.device)
            .permute([0, 3, 1, 2])
    }
}

/// Split an NCHW model output into HWC images.
pub fn to_images<B: Backend>(output: Tensor<B, 4>) -> Result<Vec<FloatImage>> {
    let [n, c, h, w] = output.dims();
    let data = output
        .permute([0, 2, 3, 1])
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("Cannot read model output: {e:?}"))?;
    Ok(split_images(&data, [n, h, w, c]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_batch_is_nchw_and_round_trips() {
        let device = Default::default();
        let batcher = SrBatcher::<TestBackend>::new(device);

        // 1 x 2 x 3 x 3 NHWC, value = position
        let lr: Vec<f32> = (0..18).map(|v| v as f32).collect();
        let item = ImageBatch { lr: lr.clone(), lr_dims: [1, 2, 3, 3], hr: lr, hr_dims: [1, 2, 3, 3] };

        let batch = batcher.batch(&item);
        assert_eq!(batch.lr.dims(), [1, 3, 2, 3]);

        let images = to_images(batch.lr).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].height, 2);
        assert_eq!(images[0].width, 3);
        assert_eq!(images[0].data, item.lr);
    }
}
