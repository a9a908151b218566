// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from image files on disk to tensor batches.
//
//   image dirs (png/jpg)
//       │
//       ▼
//   cache        → one-time decode into `<dir>_pt/<stem>.pt`
//       │
//       ▼
//   manifest     → ordered sample identifiers
//       │
//       ▼
//   patch        → random crop + flip/transpose, LR and HR in lockstep
//       │
//       ▼
//   dataset      → PatchSampler: numbered batches per epoch
//       │
//       ▼
//   batcher      → NHWC floats → NCHW Burn tensors
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads the manifest of sample identifiers
pub mod manifest;

/// Serialized per-image cache and its one-time converter
pub mod cache;

/// Patch cropping and geometric augmentation
pub mod patch;

/// The patch sampler that feeds training and validation
pub mod dataset;

/// Builds Burn tensors from image batches
pub mod batcher;
