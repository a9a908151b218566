// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All network, loss and optimization code lives here.
//
//   quant.rs       — fake quantization with a straight-through
//                    gradient, used by QAT layers
//
//   model.rs       — the anchor-based SR network; per-layer
//                    quantization resolved from a policy map
//
//   loss.rs        — pixelwise (MAE) and perceptual losses
//
//   schedule.rs    — milestone learning-rate decay
//
//   solver.rs      — start modes (fresh / resume / QAT), the
//                    epoch loop and the end-of-epoch hook trait
//
//   validation.rs  — PSNR, the validation pass, and the
//                    checkpoint controller hook
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Straight-through fake quantization
pub mod quant;

/// SR network architecture
pub mod model;

/// Training losses
pub mod loss;

/// Learning-rate milestones
pub mod schedule;

/// Model initialization and the training loop
pub mod solver;

/// Validation, PSNR and checkpointing per epoch
pub mod validation;
