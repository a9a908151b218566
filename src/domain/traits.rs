// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The training loop only sees these traits, never the
// concrete sampler or metrics writer:
//   - PatchSampler implements BatchSource
//   - CsvMetricsSink implements MetricsSink
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

use crate::domain::image::ImageBatch;

// ─── BatchSource ──────────────────────────────────────────────────────────────
/// Anything that can hand out numbered batches for one epoch.
pub trait BatchSource {
    /// Number of batches in one epoch
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build batch `index`. Indices run from 0 to `len() - 1`.
    fn batch(&self, index: usize) -> Result<ImageBatch>;

    /// Reorder the underlying samples before the next epoch.
    /// Requires exclusive access, so no batch can be in flight.
    fn shuffle(&mut self);
}

// ─── MetricsSink ──────────────────────────────────────────────────────────────
/// Receives named scalar time series keyed by epoch
/// (`train_loss`, `val_psnr`).
pub trait MetricsSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()>;
}
