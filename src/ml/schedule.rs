// ============================================================
// Layer 5 — Learning-Rate Schedule
// ============================================================
// Milestone decay applied at the start of every epoch:
//
//   if epoch ∈ milestones:  lr ← lr · gamma
//
// The update is relative to the *current* rate. A resumed run
// that starts on an epoch already past a milestone does not
// replay earlier decays, but a run resumed exactly on a
// milestone epoch that was already applied decays it again.

#[derive(Debug, Clone, PartialEq)]
pub struct MilestoneLr {
    lr:         f64,
    milestones: Vec<usize>,
    gamma:      f64,
}

impl MilestoneLr {
    pub fn new(lr: f64, milestones: Vec<usize>, gamma: f64) -> Self {
        Self { lr, milestones, gamma }
    }

    /// Rate to train `epoch` with; decays first on a milestone.
    pub fn step(&mut self, epoch: usize) -> f64 {
        if self.milestones.contains(&epoch) {
            let next = self.lr * self.gamma;
            tracing::info!("Epoch {epoch}: learning rate {:.3e} -> {:.3e}", self.lr, next);
            self.lr = next;
        }
        self.lr
    }

    pub fn current(&self) -> f64 {
        self.lr
    }
}
