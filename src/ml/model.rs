// ============================================================
// Layer 5 — SR Network
// ============================================================
// A compact anchor-based plain network for mobile SR:
//
//   x ─┬─ conv_first ─ relu ─ body.0 ─ relu … body.N-1 ─ relu ─ conv_last ─┐
//      │                                                                   (+) ─ depth_to_space ─ clamp[0,255]
//      └─ anchor: repeat every channel scale² times ───────────────────────┘
//
// The anchor makes the body learn only the residual over a
// nearest-neighbour upscale. Pixel values stay in [0, 255].
//
// Quantization is decided per named layer at construction
// time from a LayerPolicyMap. Layer names:
//   conv_first, body.{i}, conv_last, anchor, depth_to_space

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::domain::{
    image::CHANNELS,
    policy::{LayerPolicy, LayerPolicyMap},
};
use crate::ml::quant::fake_quantize;

/// Layers the deployment runtime keeps in float.
pub const NON_QUANTIZABLE_LAYERS: [&str; 2] = ["anchor", "depth_to_space"];

#[derive(Config, Debug)]
pub struct SrNetConfig {
    pub scale: usize,
    #[config(default = 28)]
    pub num_features: usize,
    #[config(default = 4)]
    pub num_blocks: usize,
    /// Bit width used by layers whose policy is Quantize
    #[config(default = 8)]
    pub quant_bits: usize,
}

impl SrNetConfig {
    /// Policy for quantization-aware training: everything is
    /// quantized except the tensor-shuffling layers, plus any
    /// extra names supplied by the caller.
    pub fn qat_policy<S: AsRef<str>>(&self, extra_passthrough: &[S]) -> LayerPolicyMap {
        LayerPolicyMap::quantize_except(
            NON_QUANTIZABLE_LAYERS
                .iter()
                .map(|s| s.to_string())
                .chain(extra_passthrough.iter().map(|s| s.as_ref().to_string())),
        )
    }

    /// Full-precision network.
    pub fn init<B: Backend>(&self, device: &B::Device) -> SrNet<B> {
        self.init_with_policy(&LayerPolicyMap::full_precision(), device)
    }

    pub fn init_with_policy<B: Backend>(&self, policy: &LayerPolicyMap, device: &B::Device) -> SrNet<B> {
        let bits = |name: &str| match policy.resolve(name) {
            LayerPolicy::Quantize    => self.quant_bits,
            LayerPolicy::Passthrough => 0,
        };
        let out_channels = CHANNELS * self.scale * self.scale;

        let conv_first = QuantConv::new(CHANNELS, self.num_features, bits("conv_first"), device);
        let body = (0..self.num_blocks)
            .map(|i| QuantConv::new(self.num_features, self.num_features, bits(&format!("body.{i}")), device))
            .collect();
        let conv_last = QuantConv::new(self.num_features, out_channels, bits("conv_last"), device);

        SrNet {
            conv_first,
            body,
            conv_last,
            scale:               self.scale,
            anchor_bits:         bits("anchor"),
            depth_to_space_bits: bits("depth_to_space"),
        }
    }
}

// ─── QuantConv ────────────────────────────────────────────────────────────────
/// 3x3 same-padding convolution with optional fake-quantized
/// weights and output.
#[derive(Module, Debug)]
pub struct QuantConv<B: Backend> {
    pub conv: Conv2d<B>,
    /// 0 = full precision
    pub bits: usize,
}

impl<B: Backend> QuantConv<B> {
    fn new(c_in: usize, c_out: usize, bits: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([c_in, c_out], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        Self { conv, bits }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        if self.bits == 0 {
            return self.conv.forward(x);
        }
        let weight = fake_quantize(self.conv.weight.val(), self.bits);
        let bias   = self.conv.bias.as_ref().map(|b| b.val());
        let out = burn::tensor::module::conv2d(
            x,
            weight,
            bias,
            burn::tensor::ops::ConvOptions::new([1, 1], [1, 1], [1, 1], 1),
        );
        fake_quantize(out, self.bits)
    }

    pub fn is_quantized(&self) -> bool {
        self.bits > 0
    }
}

// ─── SrNet ────────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct SrNet<B: Backend> {
    pub conv_first:          QuantConv<B>,
    pub body:                Vec<QuantConv<B>>,
    pub conv_last:           QuantConv<B>,
    pub scale:               usize,
    pub anchor_bits:         usize,
    pub depth_to_space_bits: usize,
}

impl<B: Backend> SrNet<B> {
    /// x: [batch, 3, h, w] in [0, 255] → [batch, 3, h*scale, w*scale]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let anchor = fake_quantize(self.anchor(x.clone()), self.anchor_bits);

        let mut h = relu(self.conv_first.forward(x));
        for block in &self.body {
            h = relu(block.forward(h));
        }
        let h = self.conv_last.forward(h) + anchor;

        let out = fake_quantize(depth_to_space(h, self.scale), self.depth_to_space_bits);
        out.clamp(0.0, 255.0)
    }

    /// Repeat each input channel scale² times so that after the
    /// pixel shuffle every output pixel starts from its LR pixel.
    fn anchor(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [n, c, h, w] = x.dims();
        let r2 = self.scale * self.scale;
        let x = x.reshape([n, c, 1, h, w]);
        Tensor::cat(vec![x; r2], 2).reshape([n, c * r2, h, w])
    }

    /// Names of the layers running with fake quantization.
    pub fn quantized_layers(&self) -> Vec<String> {
        let mut names = Vec::new();
        if self.conv_first.is_quantized() {
            names.push("conv_first".to_string());
        }
        for (i, block) in self.body.iter().enumerate() {
            if block.is_quantized() {
                names.push(format!("body.{i}"));
            }
        }
        if self.conv_last.is_quantized() {
            names.push("conv_last".to_string());
        }
        if self.anchor_bits > 0 {
            names.push("anchor".to_string());
        }
        if self.depth_to_space_bits > 0 {
            names.push("depth_to_space".to_string());
        }
        names
    }
}

/// Pixel shuffle: [n, c·r², h, w] → [n, c, h·r, w·r]
/// Input channel `c·r² + i·r + j` fills output offset (i, j).
pub fn depth_to_space<B: Backend>(x: Tensor<B, 4>, r: usize) -> Tensor<B, 4> {
    let [n, c, h, w] = x.dims();
    let out_c = c / (r * r);
    x.reshape([n, out_c, r, r, h, w])
        .permute([0, 1, 4, 2, 5, 3])
        .reshape([n, out_c, h * r, w * r])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_forward_upscales_and_clamps() {
        let device = Default::default();
        let net: SrNet<TestBackend> = SrNetConfig::new(3).with_num_features(8).with_num_blocks(2).init(&device);

        let x = Tensor::<TestBackend, 4>::ones([2, 3, 5, 7], &device).mul_scalar(128.0);
        let y = net.forward(x);
        assert_eq!(y.dims(), [2, 3, 15, 21]);

        let values: Vec<f32> = y.into_data().to_vec().unwrap();
        assert!(values.iter().all(|v| (0.0..=255.0).contains(v)));
    }

    #[test]
    fn test_depth_to_space_layout() {
        let device = Default::default();
        // one output channel, r = 2, 1x1 spatial: channels 0..4 become a 2x2 block
        let x = Tensor::<TestBackend, 1>::from_floats([0.0, 1.0, 2.0, 3.0], &device).reshape([1, 4, 1, 1]);
        let y: Vec<f32> = depth_to_space(x, 2).into_data().to_vec().unwrap();
        assert_eq!(y, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_anchor_is_nearest_upscale() {
        let device = Default::default();
        let mut net: SrNet<TestBackend> = SrNetConfig::new(2).with_num_features(4).with_num_blocks(0).init(&device);
        // zero the residual path so only the anchor remains
        net.conv_last.conv.weight = net.conv_last.conv.weight.map(|w| w.zeros_like());
        net.conv_last.conv.bias = net.conv_last.conv.bias.map(|b| b.map(|t| t.zeros_like()));

        let plane = Tensor::<TestBackend, 1>::from_floats([10.0, 20.0, 30.0, 40.0], &device)
            .reshape([1, 1, 2, 2]);
        let x = Tensor::cat(vec![plane; 3], 1);
        let y: Vec<f32> = net.forward(x).slice([0..1, 0..1, 0..4, 0..4]).into_data().to_vec().unwrap();
        assert_eq!(y, vec![
            10.0, 10.0, 20.0, 20.0,
            10.0, 10.0, 20.0, 20.0,
            30.0, 30.0, 40.0, 40.0,
            30.0, 30.0, 40.0, 40.0,
        ]);
    }

    #[test]
    fn test_policy_selects_quantized_layers() {
        let device = Default::default();
        let cfg = SrNetConfig::new(2).with_num_blocks(1);
        let fp: SrNet<TestBackend> = cfg.init(&device);
        assert!(fp.quantized_layers().is_empty());

        let qat: SrNet<TestBackend> = cfg.init_with_policy(&cfg.qat_policy(&["conv_last"]), &device);
        assert_eq!(qat.quantized_layers(), vec!["conv_first", "body.0"]);
        assert_eq!(qat.body[0].bits, 8);
    }
}
