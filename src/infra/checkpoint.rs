// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores everything needed to resume training.
//
// Files, for a model path of `ckp/model`:
//
//   ckp/model.mpk.gz        ← network weights
//   ckp/model_optim.mpk.gz  ← Adam moment estimates
//   ckp/model_meta.json     ← epoch, current learning rate, loss kind
//   ckp/state.json          ← TrainingState (best result so far)
//
// The first three are overwritten every validation cycle;
// state.json is written only when the best PSNR improves.
//
// Records use Burn's named MessagePack recorder at full
// precision, so a resumed or QAT run starts from the exact
// weights that were saved.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{
    optim::Optimizer,
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::state::TrainingState;
use crate::ml::{loss::LossKind, model::SrNet};

pub type CheckpointRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

const RECORD_SUFFIX: &str = ".mpk.gz";

/// What the optimizer record alone does not capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch:         usize,
    pub learning_rate: f64,
    pub loss:          LossKind,
}

pub struct CheckpointManager {
    /// Weights path without the recorder extension
    model_path: PathBuf,
    state_path: PathBuf,
    recorder:   CheckpointRecorder,
}

impl CheckpointManager {
    /// Parent directories are created eagerly.
    pub fn new(model_path: impl Into<PathBuf>, state_path: impl Into<PathBuf>) -> Self {
        let model_path = strip_record_suffix(model_path.into());
        let state_path = state_path.into();
        for dir in [model_path.parent(), state_path.parent()].into_iter().flatten() {
            fs::create_dir_all(dir).ok();
        }
        Self { model_path, state_path, recorder: CheckpointRecorder::new() }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.model_path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    pub fn optim_path(&self) -> PathBuf {
        self.sibling("_optim")
    }

    pub fn meta_path(&self) -> PathBuf {
        self.sibling("_meta.json")
    }

    /// Overwrite weights, optimizer state and meta.
    pub fn save_model<B, O>(&self, model: &SrNet<B>, optim: &O, meta: &CheckpointMeta) -> Result<()>
    where
        B: AutodiffBackend,
        O: Optimizer<SrNet<B>, B>,
    {
        model
            .clone()
            .save_file(self.model_path.clone(), &self.recorder)
            .with_context(|| format!("Failed to save model to '{}'", self.model_path.display()))?;

        let optim_path = self.optim_path();
        self.recorder
            .record(optim.to_record(), optim_path.clone())
            .with_context(|| format!("Failed to save optimizer to '{}'", optim_path.display()))?;

        let meta_path = self.meta_path();
        fs::write(&meta_path, serde_json::to_string_pretty(meta)?)
            .with_context(|| format!("Cannot write '{}'", meta_path.display()))?;

        tracing::debug!("Saved checkpoint for epoch {} to '{}'", meta.epoch, self.model_path.display());
        Ok(())
    }

    /// Load weights into a model of the matching architecture.
    pub fn load_model<B: Backend>(&self, model: SrNet<B>, device: &B::Device) -> Result<SrNet<B>> {
        model
            .load_file(self.model_path.clone(), &self.recorder, device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}{}'", self.model_path.display(), RECORD_SUFFIX)
            })
    }

    pub fn load_optimizer<B, O>(&self, optim: O, device: &B::Device) -> Result<O>
    where
        B: AutodiffBackend,
        O: Optimizer<SrNet<B>, B>,
    {
        let path = self.optim_path();
        let record = self
            .recorder
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load optimizer state '{}{}'", path.display(), RECORD_SUFFIX))?;
        Ok(optim.load_record(record))
    }

    pub fn load_meta(&self) -> Result<CheckpointMeta> {
        let path = self.meta_path();
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read checkpoint meta '{}'", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save_state(&self, state: &TrainingState) -> Result<()> {
        fs::write(&self.state_path, serde_json::to_string_pretty(state)?)
            .with_context(|| format!("Cannot write state '{}'", self.state_path.display()))?;
        tracing::debug!("Saved training state to '{}'", self.state_path.display());
        Ok(())
    }

    pub fn load_state(&self) -> Result<TrainingState> {
        let json = fs::read_to_string(&self.state_path)
            .with_context(|| format!("Cannot read state '{}'", self.state_path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }
}

fn strip_record_suffix(path: PathBuf) -> PathBuf {
    match path.to_str().and_then(|s| s.strip_suffix(RECORD_SUFFIX)) {
        Some(stem) => PathBuf::from(stem),
        None => path,
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::SrNetConfig;
    use burn::{
        backend::{Autodiff, NdArray},
        optim::AdamConfig,
    };

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().join("ckp/model"), dir.path().join("ckp/state.json"));

        let state = TrainingState { current_epoch: 4, best_epoch: 4, best_psnr: 31.25 };
        ckpt.save_state(&state).unwrap();
        assert_eq!(ckpt.load_state().unwrap(), state);
    }

    #[test]
    fn test_missing_files_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().join("model"), dir.path().join("state.json"));
        let device = Default::default();

        assert!(ckpt.load_state().is_err());
        assert!(ckpt.load_meta().is_err());
        let model: SrNet<TestBackend> = SrNetConfig::new(2).init(&device);
        assert!(ckpt.load_model(model, &device).is_err());
    }

    #[test]
    fn test_model_optimizer_and_meta_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().join("model.mpk.gz"), dir.path().join("state.json"));
        assert_eq!(ckpt.model_path(), dir.path().join("model"));

        let device = Default::default();
        let cfg = SrNetConfig::new(2).with_num_features(4).with_num_blocks(1);
        let model: SrNet<TestBackend> = cfg.init(&device);
        let optim = AdamConfig::new().init::<TestBackend, SrNet<TestBackend>>();
        let meta = CheckpointMeta { epoch: 3, learning_rate: 5e-4, loss: LossKind::Perceptual };

        ckpt.save_model(&model, &optim, &meta).unwrap();
        assert!(dir.path().join("model.mpk.gz").is_file());
        assert!(dir.path().join("model_optim.mpk.gz").is_file());
        assert_eq!(ckpt.load_meta().unwrap(), meta);

        let fresh: SrNet<TestBackend> = cfg.init(&device);
        let loaded = ckpt.load_model(fresh, &device).unwrap();
        let before: Vec<f32> = model.conv_first.conv.weight.val().into_data().to_vec().unwrap();
        let after: Vec<f32> = loaded.conv_first.conv.weight.val().into_data().to_vec().unwrap();
        assert_eq!(before, after);

        let fresh_optim = AdamConfig::new().init::<TestBackend, SrNet<TestBackend>>();
        assert!(ckpt.load_optimizer(fresh_optim, &device).is_ok());
    }
}
