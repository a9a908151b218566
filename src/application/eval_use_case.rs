// ============================================================
// Layer 2 — Evaluate Use Case
// ============================================================
// Scores a saved checkpoint on the validation split:
//   1. rebuild the network from the saved training config
//      (QAT runs get their quantization policy back)
//   2. load the checkpoint weights
//   3. average PSNR with the same routine used during training

use anyhow::Result;
use burn::prelude::*;
use std::path::PathBuf;

use crate::application::train_use_case::{ExperimentPaths, TrainConfig};
use crate::data::dataset::PatchSampler;
use crate::domain::policy::LayerPolicyMap;
use crate::infra::{checkpoint::CheckpointManager, progress::Progress};
use crate::ml::{model::SrNet, validation::validate};

pub struct EvalUseCase {
    config:     TrainConfig,
    checkpoint: PathBuf,
    quiet:      bool,
}

impl EvalUseCase {
    /// `checkpoint` defaults to the experiment's own `ckp/model`.
    pub fn new(config: TrainConfig, checkpoint: Option<PathBuf>) -> Self {
        let checkpoint = checkpoint.unwrap_or_else(|| ExperimentPaths::new(&config.paths.root).model);
        Self { config, checkpoint, quiet: false }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Average validation PSNR in dB.
    pub fn execute<B: Backend>(&self, device: B::Device) -> Result<f64> {
        let cfg = &self.config;
        let policy = if cfg.solver.qat {
            cfg.networks.qat_policy(&cfg.solver.qat_passthrough)
        } else {
            LayerPolicyMap::full_precision()
        };

        let paths = ExperimentPaths::new(&cfg.paths.root);
        let ckpt  = CheckpointManager::new(&self.checkpoint, &paths.state);
        let model: SrNet<B> = ckpt.load_model(cfg.networks.init_with_policy(&policy, &device), &device)?;
        tracing::info!("Evaluating '{}' on {} images", self.checkpoint.display(), cfg.datasets.val.filename_path.display());

        let val_data = PatchSampler::new(cfg.datasets.val.clone(), 1)?;
        let bar = if self.quiet {
            Progress::hidden(val_data.length())
        } else {
            Progress::new(val_data.length(), "Evaluating...")
        };
        let psnr = validate(&model, &val_data, &device, &bar)?;
        tracing::info!("Average PSNR: {psnr:.4} dB over {} images", val_data.length());
        Ok(psnr)
    }
}
