// ============================================================
// Layer 3 — Training State
// ============================================================
// The small blob that lets a run pick up where it left off:
//
//   current_epoch — epoch of the last promoted validation
//   best_epoch    — epoch that produced best_psnr
//   best_psnr     — best average validation PSNR so far
//
// A fresh run starts from -1 everywhere so the first
// validation always promotes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    pub current_epoch: i64,
    pub best_epoch:    i64,
    pub best_psnr:     f64,
}

impl Default for TrainingState {
    fn default() -> Self {
        Self { current_epoch: -1, best_epoch: -1, best_psnr: -1.0 }
    }
}

impl TrainingState {
    /// First epoch a resumed run trains.
    pub fn resume_epoch(&self) -> usize {
        (self.current_epoch + 1).max(0) as usize
    }

    /// Record a validation result. Ties go to the newer epoch.
    /// Returns true when the state changed and should be persisted.
    pub fn promote(&mut self, epoch: usize, psnr: f64) -> bool {
        if psnr >= self.best_psnr {
            self.best_psnr     = psnr;
            self.best_epoch    = epoch as i64;
            self.current_epoch = epoch as i64;
            true
        } else {
            false
        }
    }
}
