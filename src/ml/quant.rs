// ============================================================
// Layer 5 — Fake Quantization
// ============================================================
// Quantization-aware training keeps float weights but rounds
// them (and layer outputs) to an integer grid in the forward
// pass, so the network learns to tolerate the rounding it will
// see after deployment:
//
//   scale = max|x| / (2^(bits-1) - 1)
//   q     = clamp(round(x / scale), -qmax, qmax) * scale
//
// The backward pass uses the straight-through estimator:
//   y = x + (q - x).detach()
// so gradients flow as if the rounding were the identity.

use burn::prelude::*;

/// Symmetric per-tensor fake quantization to `bits` bits.
/// `bits == 0` returns the input unchanged.
pub fn fake_quantize<B: Backend, const D: usize>(x: Tensor<B, D>, bits: usize) -> Tensor<B, D> {
    if bits < 2 {
        return x;
    }
    let qmax = ((1u64 << (bits - 1)) - 1) as f32;
    let max_abs: f32 = x.clone().abs().max().into_scalar().elem::<f32>();
    if max_abs <= f32::EPSILON {
        return x;
    }

    let scale = max_abs / qmax;
    let quantized = x
        .clone()
        .div_scalar(scale)
        .round()
        .clamp(-qmax, qmax)
        .mul_scalar(scale);
    x.clone() + (quantized - x).detach()
}
