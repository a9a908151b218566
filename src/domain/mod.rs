// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits describing what the
// trainer works with. Nothing in here touches Burn or the
// filesystem, so every type can be unit tested on its own.
//
//   image.rs   — float image / batch containers (NHWC)
//   state.rs   — persisted training progress and best result
//   policy.rs  — per-layer quantization policy map
//   traits.rs  — seams the other layers implement
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

/// NHWC float images and batches
pub mod image;

/// Training progress that survives restarts
pub mod state;

/// Quantize / passthrough decisions per named layer
pub mod policy;

/// Core abstractions (traits) that other layers implement
pub mod traits;
