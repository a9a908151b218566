// ============================================================
// Layer 5 — Training Losses
// ============================================================
//   pixelwise  — mean absolute error between SR and HR
//   perceptual — MSE between feature maps of SR and HR
//                + the pixelwise term
//
// The feature extractor is a black box behind the
// FeatureExtractor trait. EdgeFeatures is a parameter-free
// stand-in (horizontal and vertical image gradients) used when
// no pretrained backbone is plugged in.

use burn::{
    nn::loss::{MseLoss, Reduction},
    prelude::*,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossKind {
    #[default]
    Pixelwise,
    Perceptual,
}

/// Maps an NCHW image batch to NCHW feature maps.
pub trait FeatureExtractor<B: Backend> {
    fn extract(&self, x: Tensor<B, 4>) -> Tensor<B, 4>;
}

/// First-order image gradients on [0, 1]-scaled input.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeFeatures;

impl<B: Backend> FeatureExtractor<B> for EdgeFeatures {
    fn extract(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [n, c, h, w] = x.dims();
        let x = x.div_scalar(255.0);
        if h < 2 || w < 2 {
            return x;
        }
        let base = x.clone().slice([0..n, 0..c, 0..h - 1, 0..w - 1]);
        let dx = x.clone().slice([0..n, 0..c, 0..h - 1, 1..w]) - base.clone();
        let dy = x.slice([0..n, 0..c, 1..h, 0..w - 1]) - base;
        Tensor::cat(vec![dx, dy], 1)
    }
}

pub struct SrLoss<B: Backend> {
    kind:      LossKind,
    extractor: Box<dyn FeatureExtractor<B>>,
}

impl<B: Backend> SrLoss<B> {
    pub fn new(kind: LossKind) -> Self {
        Self::with_extractor(kind, Box::new(EdgeFeatures))
    }

    pub fn with_extractor(kind: LossKind, extractor: Box<dyn FeatureExtractor<B>>) -> Self {
        Self { kind, extractor }
    }

    pub fn kind(&self) -> LossKind {
        self.kind
    }

    pub fn forward(&self, sr: Tensor<B, 4>, hr: Tensor<B, 4>) -> Tensor<B, 1> {
        let pixelwise = (sr.clone() - hr.clone()).abs().mean();
        match self.kind {
            LossKind::Pixelwise => pixelwise,
            LossKind::Perceptual => {
                let sr_features = self.extractor.extract(sr);
                let hr_features = self.extractor.extract(hr);
                MseLoss::new().forward(hr_features, sr_features, Reduction::Mean) + pixelwise
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar().elem::<f32>()
    }

    #[test]
    fn test_pixelwise_is_mean_absolute_error() {
        let device = Default::default();
        let sr = Tensor::<TestBackend, 4>::zeros([1, 3, 2, 2], &device);
        let hr = Tensor::<TestBackend, 4>::ones([1, 3, 2, 2], &device).mul_scalar(4.0);
        let loss = SrLoss::new(LossKind::Pixelwise).forward(sr, hr);
        assert!((scalar(loss) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_perceptual_adds_feature_term() {
        let device = Default::default();
        let flat = Tensor::<TestBackend, 4>::ones([1, 3, 4, 4], &device).mul_scalar(100.0);
        let ramp = Tensor::<TestBackend, 1, Int>::arange(0..48, &device)
            .float()
            .reshape([1, 3, 4, 4])
            .mul_scalar(5.0);

        let pixel = scalar(SrLoss::new(LossKind::Pixelwise).forward(flat.clone(), ramp.clone()));
        let perceptual = scalar(SrLoss::new(LossKind::Perceptual).forward(flat, ramp));
        assert!(perceptual > pixel);
    }

    #[test]
    fn test_identical_images_have_zero_loss() {
        let device = Default::default();
        let img = Tensor::<TestBackend, 4>::ones([2, 3, 3, 3], &device).mul_scalar(42.0);
        let loss = SrLoss::new(LossKind::Perceptual).forward(img.clone(), img);
        assert!(scalar(loss).abs() < 1e-6);
    }

    #[test]
    fn test_loss_kind_parses_from_config() {
        let kind: LossKind = serde_json::from_str("\"perceptual\"").unwrap();
        assert_eq!(kind, LossKind::Perceptual);
    }
}
