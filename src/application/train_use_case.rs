// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one training run in order:
//
//   Step 1: Validate the config               (Layer 2)
//   Step 2: Create the experiment layout      (Layer 6 - infra)
//   Step 3: Save the effective config         (Layer 2)
//   Step 4: Build train / val samplers        (Layer 4 - data)
//   Step 5: Pick the start mode and init      (Layer 5 - ml)
//   Step 6: Wire the checkpoint controller    (Layer 5 / 6)
//   Step 7: Run the epoch loop                (Layer 5 - ml)
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{bail, Context, Result};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::data::dataset::{DatasetOptions, PatchSampler};
use crate::domain::{image::Split, state::TrainingState};
use crate::infra::{checkpoint::CheckpointManager, logging::LogContext, metrics::CsvMetricsSink};
use crate::ml::{
    model::SrNetConfig,
    solver::{initialize, EpochEndObserver, InitMode, Solver, SolverOptions},
    validation::CheckpointController,
};

// ─── Training Configuration ──────────────────────────────────────────────────
// Mirrors the JSON option file. Loaded once, adjusted by CLI
// flags, validated, then written back into the experiment root
// so `evaluate` can rebuild the exact same network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub name:     String,
    pub scale:    usize,
    pub paths:    PathsConfig,
    pub datasets: DatasetsConfig,
    pub networks: SrNetConfig,
    #[serde(default)]
    pub solver:   SolverOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Experiment directory; everything a run writes goes under it
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetsConfig {
    pub train: DatasetOptions,
    pub val:   DatasetOptions,
}

impl TrainConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Invalid config '{}'", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Cannot write config '{}'", path.display()))
    }

    /// Reject configs that would only fail deep inside training.
    pub fn validate(&self) -> Result<()> {
        let sections = [
            ("datasets.train", self.datasets.train.scale),
            ("datasets.val", self.datasets.val.scale),
            ("networks", self.networks.scale),
        ];
        for (section, scale) in sections {
            if scale != self.scale {
                bail!("{section}.scale is {scale}, expected {}", self.scale);
            }
        }
        if self.scale == 0 {
            bail!("scale must be at least 1");
        }

        let train = &self.datasets.train;
        if train.split != Split::Train {
            bail!("datasets.train must use split \"train\"");
        }
        if self.datasets.val.split != Split::Eval {
            bail!("datasets.val must use split \"eval\"");
        }
        if train.batch_size == 0 {
            bail!("datasets.train.batch_size must be at least 1");
        }
        if train.patch_size == 0 {
            bail!("datasets.train.patch_size must be at least 1");
        }
        if train.enlarge_times == 0 {
            bail!("datasets.train.enlarge_times must be at least 1");
        }
        if self.solver.val_step == 0 {
            bail!("solver.val_step must be at least 1");
        }
        if self.solver.qat && !self.solver.resume && self.solver.qat_path.is_none() {
            bail!("solver.qat is set but solver.qat_path is missing");
        }
        Ok(())
    }
}

// ─── Experiment Layout ────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct ExperimentPaths {
    pub root:    PathBuf,
    /// Checkpoint stem; the recorder adds `.mpk.gz`
    pub model:   PathBuf,
    pub state:   PathBuf,
    pub log:     PathBuf,
    pub metrics: PathBuf,
    pub config:  PathBuf,
}

impl ExperimentPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let ckp  = root.join("ckp");
        Self {
            model:   ckp.join("model"),
            state:   ckp.join("state.json"),
            log:     root.join("train.log"),
            metrics: root.join("metrics.csv"),
            config:  root.join("train_config.json"),
            root,
        }
    }

    pub fn create(&self) -> Result<()> {
        for path in [&self.model, &self.log] {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).with_context(|| format!("Cannot create '{}'", dir.display()))?;
            }
        }
        Ok(())
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
    paths:  ExperimentPaths,
    quiet:  bool,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        let paths = ExperimentPaths::new(&config.paths.root);
        Self { config, paths, quiet: false }
    }

    /// Hide progress bars.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn paths(&self) -> &ExperimentPaths {
        &self.paths
    }

    /// Run training end to end and return the final best-result state.
    pub fn execute<B: AutodiffBackend>(&self, device: B::Device) -> Result<TrainingState> {
        let cfg = &self.config;

        // ── Step 1: Validate ──────────────────────────────────────────────────
        cfg.validate()?;

        // ── Step 2 + 3: Experiment layout and effective config ────────────────
        self.paths.create()?;
        cfg.save(&self.paths.config)?;

        let log = LogContext::new(cfg.name.clone());
        {
            let _run = log.enter();
            tracing::info!("Experiment root: '{}'", self.paths.root.display());
        }

        // ── Step 4: Samplers ──────────────────────────────────────────────────
        // Both roots are converted to the image cache on first use.
        let mut train_data = PatchSampler::new(cfg.datasets.train.clone(), cfg.solver.workers)?;
        let val_data       = PatchSampler::new(cfg.datasets.val.clone(), 1)?;
        tracing::info!(
            "Train: {} batches/epoch, Val: {} images",
            train_data.length(),
            val_data.length()
        );

        // ── Step 5: Start mode → model + optimizer ────────────────────────────
        let mode = InitMode::from_options(&cfg.networks, &cfg.solver, &self.paths.model, &self.paths.state)?;
        let init = initialize::<B>(&mode, &cfg.solver, &device)?;

        // ── Step 6: End-of-epoch controller ───────────────────────────────────
        let controller = CheckpointController::new(
            Box::new(val_data),
            Box::new(CsvMetricsSink::new(&self.paths.metrics)?),
            CheckpointManager::new(&self.paths.model, &self.paths.state),
            init.state,
            cfg.solver.val_step,
            init.loss,
            log.clone(),
        )
        .with_progress(!self.quiet);

        // ── Step 7: Epoch loop ────────────────────────────────────────────────
        let solver = Solver::new(init, &cfg.solver, device, log).with_progress(!self.quiet);
        tracing::info!(
            "Training epochs {}..{} with {:?} loss",
            solver.initial_epoch(),
            cfg.solver.epochs,
            solver.loss_kind()
        );

        let mut observers: Vec<Box<dyn EpochEndObserver<B, _>>> = vec![Box::new(controller)];
        solver.fit(&mut train_data, &mut observers)?;

        final_state(&CheckpointManager::new(&self.paths.model, &self.paths.state))
    }
}

/// Best result of the run. state.json only exists once a
/// validation cycle has promoted, so a missing file means no
/// result yet; an unreadable one is an error.
fn final_state(ckpt: &CheckpointManager) -> Result<TrainingState> {
    if !ckpt.state_path().exists() {
        return Ok(TrainingState::default());
    }
    ckpt.load_state()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::dataset::tests::write_fixture;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    /// A tiny but complete config over the dataset fixture.
    pub(crate) fn config_json(data: &Path, root: &Path) -> String {
        let data = data.display();
        format!(
            r#"{{
  "name": "tiny_x2",
  "scale": 2,
  "paths": {{ "root": "{root}" }},
  "datasets": {{
    "train": {{ "dataroot_HR": "{data}/HR", "dataroot_LR": "{data}/LR", "filename_path": "{data}/list.txt",
               "scale": 2, "split": "train", "patch_size": 4, "batch_size": 2,
               "flip": true, "rot": true, "enlarge_times": 1 }},
    "val":   {{ "dataroot_HR": "{data}/HR", "dataroot_LR": "{data}/LR", "filename_path": "{data}/list.txt",
               "scale": 2, "split": "eval", "batch_size": 1 }}
  }},
  "networks": {{ "scale": 2, "num_features": 4, "num_blocks": 1, "quant_bits": 8 }},
  "solver": {{ "lr": 0.001, "lr_steps": [1], "lr_gamma": 0.5, "loss": "pixelwise",
              "epochs": 2, "val_step": 1, "workers": 2 }}
}}"#,
            root = root.display(),
        )
    }

    fn load(json: &str) -> TrainConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_config_parses_and_validates() {
        let cfg = load(&config_json(Path::new("/data"), Path::new("/exp")));
        assert_eq!(cfg.datasets.train.dataroot_hr, PathBuf::from("/data/HR"));
        assert_eq!(cfg.datasets.val.split, Split::Eval);
        assert_eq!(cfg.solver.lr_steps, vec![1]);
        assert!(!cfg.solver.qat);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        let base = load(&config_json(Path::new("/data"), Path::new("/exp")));

        let mut cfg = base.clone();
        cfg.datasets.val.scale = 3;
        assert!(cfg.validate().is_err());

        let mut cfg = base.clone();
        cfg.datasets.train.batch_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = base.clone();
        cfg.solver.val_step = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = base.clone();
        cfg.solver.qat = true;
        assert!(cfg.validate().is_err());
        cfg.solver.qat_path = Some(PathBuf::from("pretrained/model"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_final_state_missing_vs_corrupt() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path().join("ckp/model"), tmp.path().join("ckp/state.json"));
        assert_eq!(final_state(&ckpt).unwrap(), TrainingState::default());

        fs::write(ckpt.state_path(), "{ not json").unwrap();
        assert!(final_state(&ckpt).is_err());

        let state = TrainingState { current_epoch: 3, best_epoch: 3, best_psnr: 28.5 };
        ckpt.save_state(&state).unwrap();
        assert_eq!(final_state(&ckpt).unwrap(), state);
    }

    #[test]
    fn test_experiment_layout() {
        let paths = ExperimentPaths::new("exp");
        assert_eq!(paths.model, PathBuf::from("exp/ckp/model"));
        assert_eq!(paths.state, PathBuf::from("exp/ckp/state.json"));
        assert_eq!(paths.metrics, PathBuf::from("exp/metrics.csv"));
    }

    #[test]
    fn test_train_then_resume() {
        let tmp  = tempfile::tempdir().unwrap();
        let data = tmp.path().join("data");
        let root = tmp.path().join("exp");
        write_fixture(&data, 4);

        let cfg = load(&config_json(&data, &root));
        let state = TrainUseCase::new(cfg.clone())
            .quiet(true)
            .execute::<TestBackend>(Default::default())
            .unwrap();
        assert!(state.best_epoch >= 0);
        assert!(root.join("ckp/model.mpk.gz").is_file());
        assert!(root.join("train_config.json").is_file());

        let csv = fs::read_to_string(root.join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 1 + 2 * 2);

        // resume picks up after the promoted epoch and runs to the new limit
        let mut resumed = TrainConfig::load(&root.join("train_config.json")).unwrap();
        resumed.solver.resume = true;
        resumed.solver.epochs = 3;
        TrainUseCase::new(resumed)
            .quiet(true)
            .execute::<TestBackend>(Default::default())
            .unwrap();

        let csv = fs::read_to_string(root.join("metrics.csv")).unwrap();
        let val_steps: Vec<&str> = csv
            .lines()
            .filter(|l| l.starts_with("val_psnr"))
            .map(|l| l.split(',').nth(1).unwrap())
            .collect();
        assert_eq!(val_steps.last(), Some(&"2"));
    }
}
