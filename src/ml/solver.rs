// ============================================================
// Layer 5 — Training Orchestrator
// ============================================================
// Builds the network for one of three start modes and runs the
// epoch loop:
//
//   InitMode::Fresh   — new full-precision network
//   InitMode::Resume  — weights, Adam state, learning rate and
//                       loss kind from the last checkpoint;
//                       epoch counter from state.json
//   InitMode::Qat     — full-precision weights loaded into a
//                       network built with a quantization policy
//
// Each epoch:
//   1. lr ← schedule.step(epoch)
//   2. for every batch: forward, loss, backward, Adam step
//   3. every EpochEndObserver, in registration order
//
// Training runs on an AutodiffBackend (e.g. Autodiff<Wgpu>);
// observers receive the model and optimizer by reference.
//
// Reference: Burn Book §5 (Custom Training Loop),
//            Kingma & Ba (2015) Adam

use anyhow::{bail, Context, Result};
use burn::{
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data::batcher::SrBatcher;
use crate::domain::{policy::LayerPolicyMap, state::TrainingState, traits::BatchSource};
use crate::infra::{checkpoint::CheckpointManager, logging::LogContext, progress::Progress};
use crate::ml::{
    loss::{LossKind, SrLoss},
    model::{SrNet, SrNetConfig},
    schedule::MilestoneLr,
};

// ─── Solver Options ───────────────────────────────────────────────────────────
/// The `solver` section of the training config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    pub qat:             bool,
    pub resume:          bool,
    pub resume_path:     Option<PathBuf>,
    pub qat_path:        Option<PathBuf>,
    pub lr:              f64,
    pub lr_steps:        Vec<usize>,
    pub lr_gamma:        f64,
    pub loss:            LossKind,
    pub epochs:          usize,
    pub val_step:        usize,
    pub workers:         usize,
    /// Layers kept in full precision during QAT, on top of the
    /// network's own non-quantizable layers
    pub qat_passthrough: Vec<String>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            qat:             false,
            resume:          false,
            resume_path:     None,
            qat_path:        None,
            lr:              1e-3,
            lr_steps:        Vec::new(),
            lr_gamma:        0.5,
            loss:            LossKind::Pixelwise,
            epochs:          100,
            val_step:        1,
            workers:         1,
            qat_passthrough: Vec::new(),
        }
    }
}

// ─── Start Modes ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub enum InitMode {
    Fresh(SrNetConfig),
    Resume {
        network:    SrNetConfig,
        policy:     LayerPolicyMap,
        checkpoint: PathBuf,
        state:      PathBuf,
    },
    Qat {
        network:    SrNetConfig,
        pretrained: PathBuf,
        policy:     LayerPolicyMap,
    },
}

impl InitMode {
    /// Resume wins over QAT. A resumed QAT run is rebuilt with
    /// the QAT policy so its record matches.
    pub fn from_options(
        network:            &SrNetConfig,
        options:            &SolverOptions,
        default_checkpoint: &Path,
        state_path:         &Path,
    ) -> Result<Self> {
        let qat_policy = || network.qat_policy(&options.qat_passthrough);

        if options.resume {
            let policy = if options.qat { qat_policy() } else { LayerPolicyMap::full_precision() };
            let checkpoint = options
                .resume_path
                .clone()
                .unwrap_or_else(|| default_checkpoint.to_path_buf());
            return Ok(Self::Resume {
                network: network.clone(),
                policy,
                checkpoint,
                state: state_path.to_path_buf(),
            });
        }

        if options.qat {
            let Some(pretrained) = options.qat_path.clone() else {
                bail!("Quantization-aware training needs solver.qat_path");
            };
            return Ok(Self::Qat { network: network.clone(), pretrained, policy: qat_policy() });
        }

        Ok(Self::Fresh(network.clone()))
    }
}

/// Everything the epoch loop starts from.
pub struct ModelInit<B: AutodiffBackend, O> {
    pub model:         SrNet<B>,
    pub optim:         O,
    pub initial_epoch: usize,
    pub state:         TrainingState,
    pub learning_rate: f64,
    pub loss:          LossKind,
}

/// Build model and optimizer for `mode`. Missing checkpoint
/// files are fatal.
pub fn initialize<B: AutodiffBackend>(
    mode:    &InitMode,
    options: &SolverOptions,
    device:  &B::Device,
) -> Result<ModelInit<B, impl Optimizer<SrNet<B>, B>>> {
    // m = β1*m + (1-β1)*g        (mean)
    // v = β2*v + (1-β2)*g²       (variance)
    // θ = θ - lr * m / (√v + ε)  (update)
    let optim = AdamConfig::new().with_epsilon(1e-8).init::<B, SrNet<B>>();

    let init = match mode {
        InitMode::Fresh(network) => ModelInit {
            model:         network.init::<B>(device),
            optim,
            initial_epoch: 0,
            state:         TrainingState::default(),
            learning_rate: options.lr,
            loss:          options.loss,
        },

        InitMode::Resume { network, policy, checkpoint, state } => {
            tracing::info!("Load from checkpoint: [{}]", checkpoint.display());
            let ckpt  = CheckpointManager::new(checkpoint, state);
            let model = ckpt.load_model(network.init_with_policy::<B>(policy, device), device)?;
            let optim = ckpt.load_optimizer(optim, device)?;
            let meta  = ckpt.load_meta()?;
            let state = ckpt.load_state()?;
            tracing::info!(
                "Checkpoint state loaded: epoch {}, best PSNR {:.2} in epoch {}",
                state.current_epoch, state.best_psnr, state.best_epoch
            );
            ModelInit {
                model,
                optim,
                initial_epoch: state.resume_epoch(),
                state,
                learning_rate: meta.learning_rate,
                loss:          meta.loss,
            }
        }

        InitMode::Qat { network, pretrained, policy } => {
            tracing::info!("Loading pretrained model from [{}]", pretrained.display());
            let ckpt  = CheckpointManager::new(pretrained, pretrained.with_file_name("state.json"));
            let model = ckpt
                .load_model(network.init_with_policy::<B>(policy, device), device)
                .context("QAT needs a full-precision checkpoint of the same architecture")?;
            tracing::info!("Quantized layers: {:?}", model.quantized_layers());
            ModelInit {
                model,
                optim,
                initial_epoch: 0,
                state:         TrainingState::default(),
                learning_rate: options.lr,
                loss:          options.loss,
            }
        }
    };

    tracing::info!("Create model successfully! Params: [{:.2}]K", init.model.num_params() as f64 / 1e3);
    Ok(init)
}

// ─── Epoch Hooks ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochMetrics {
    /// Mean training loss over the epoch's batches
    pub train_loss: f64,
    /// Rate the epoch trained with
    pub lr:         f64,
}

/// What an observer sees at the end of an epoch.
pub struct EpochContext<'a, B: AutodiffBackend, O> {
    pub epoch:      usize,
    pub metrics:    EpochMetrics,
    pub model:      &'a SrNet<B>,
    pub optim:      &'a O,
    pub train_data: &'a mut dyn BatchSource,
}

pub trait EpochEndObserver<B: AutodiffBackend, O> {
    fn on_epoch_end(&mut self, ctx: EpochContext<'_, B, O>) -> Result<()>;
}

// ─── Solver ───────────────────────────────────────────────────────────────────
pub struct Solver<B: AutodiffBackend, O> {
    model:         SrNet<B>,
    optim:         O,
    schedule:      MilestoneLr,
    loss:          SrLoss<B>,
    batcher:       SrBatcher<B>,
    initial_epoch: usize,
    epochs:        usize,
    log:           LogContext,
    show_progress: bool,
}

impl<B, O> Solver<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<SrNet<B>, B>,
{
    pub fn new(init: ModelInit<B, O>, options: &SolverOptions, device: B::Device, log: LogContext) -> Self {
        Self {
            model:         init.model,
            optim:         init.optim,
            schedule:      MilestoneLr::new(init.learning_rate, options.lr_steps.clone(), options.lr_gamma),
            loss:          SrLoss::new(init.loss),
            batcher:       SrBatcher::new(device),
            initial_epoch: init.initial_epoch,
            epochs:        options.epochs,
            log,
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn initial_epoch(&self) -> usize {
        self.initial_epoch
    }

    pub fn loss_kind(&self) -> LossKind {
        self.loss.kind()
    }

    /// Train from the initial epoch up to (not including)
    /// `epochs` and return the final model.
    pub fn fit(
        self,
        train_data: &mut dyn BatchSource,
        observers:  &mut [Box<dyn EpochEndObserver<B, O>>],
    ) -> Result<SrNet<B>> {
        let Self { mut model, mut optim, mut schedule, loss, batcher, initial_epoch, epochs, log, show_progress } = self;
        let _run = log.enter();

        if initial_epoch >= epochs {
            tracing::warn!("Nothing to train: initial epoch {initial_epoch} >= epochs {epochs}");
        }

        for epoch in initial_epoch..epochs {
            let lr      = schedule.step(epoch);
            let batches = train_data.len();
            let bar = if show_progress {
                Progress::new(batches, &format!("epoch {}/{}", epoch + 1, epochs))
            } else {
                Progress::hidden(batches)
            };

            let mut loss_sum = 0.0f64;
            for index in 0..batches {
                let item  = train_data
                    .batch(index)
                    .with_context(|| format!("Epoch {epoch}: cannot build batch {index}"))?;
                let batch = batcher.batch(&item);

                let sr         = model.forward(batch.lr);
                let batch_loss = loss.forward(sr, batch.hr);
                loss_sum += batch_loss.clone().into_scalar().elem::<f64>();

                let grads = GradientsParams::from_grads(batch_loss.backward(), &model);
                model = optim.step(lr, model, grads);
                bar.inc();
            }
            bar.finish();

            let train_loss = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };
            tracing::debug!("Epoch {epoch} done: loss={train_loss:.6} lr={lr:.3e}");

            let metrics = EpochMetrics { train_loss, lr };
            for observer in observers.iter_mut() {
                observer.on_epoch_end(EpochContext {
                    epoch,
                    metrics,
                    model: &model,
                    optim: &optim,
                    train_data: &mut *train_data,
                })?;
            }
        }

        tracing::info!("Training complete!");
        Ok(model)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::image::{ImageBatch, CHANNELS};
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn tiny_net() -> SrNetConfig {
        SrNetConfig::new(2).with_num_features(4).with_num_blocks(1)
    }

    /// Constant-color 4x4 → 8x8 pairs.
    struct FlatBatches {
        batches:  usize,
        shuffles: usize,
    }

    impl BatchSource for FlatBatches {
        fn len(&self) -> usize {
            self.batches
        }

        fn batch(&self, _index: usize) -> Result<ImageBatch> {
            Ok(ImageBatch {
                lr:      vec![100.0; 2 * 4 * 4 * CHANNELS],
                lr_dims: [2, 4, 4, CHANNELS],
                hr:      vec![100.0; 2 * 8 * 8 * CHANNELS],
                hr_dims: [2, 8, 8, CHANNELS],
            })
        }

        fn shuffle(&mut self) {
            self.shuffles += 1;
        }
    }

    /// Records every hook invocation.
    #[derive(Default)]
    struct HookLog {
        seen: Vec<(usize, EpochMetrics)>,
    }

    impl<B: AutodiffBackend, O> EpochEndObserver<B, O> for std::rc::Rc<std::cell::RefCell<HookLog>> {
        fn on_epoch_end(&mut self, ctx: EpochContext<'_, B, O>) -> Result<()> {
            ctx.train_data.shuffle();
            self.borrow_mut().seen.push((ctx.epoch, ctx.metrics));
            Ok(())
        }
    }

    #[test]
    fn test_resume_takes_precedence_over_qat() {
        let opts = SolverOptions { resume: true, qat: true, qat_path: None, ..Default::default() };
        let mode = InitMode::from_options(&tiny_net(), &opts, Path::new("ckp/model"), Path::new("ckp/state.json")).unwrap();
        match mode {
            InitMode::Resume { checkpoint, policy, .. } => {
                assert_eq!(checkpoint, PathBuf::from("ckp/model"));
                assert!(policy.is_quantized());
            }
            other => panic!("expected resume, got {other:?}"),
        }
    }

    #[test]
    fn test_qat_without_path_is_rejected() {
        let opts = SolverOptions { qat: true, ..Default::default() };
        assert!(InitMode::from_options(&tiny_net(), &opts, Path::new("m"), Path::new("s")).is_err());
    }

    #[test]
    fn test_fresh_mode_by_default() {
        let mode = InitMode::from_options(&tiny_net(), &SolverOptions::default(), Path::new("m"), Path::new("s")).unwrap();
        assert!(matches!(mode, InitMode::Fresh(_)));
    }

    #[test]
    fn test_resume_with_missing_checkpoint_fails() {
        let dir  = tempfile::tempdir().unwrap();
        let mode = InitMode::Resume {
            network:    tiny_net(),
            policy:     LayerPolicyMap::full_precision(),
            checkpoint: dir.path().join("ckp/model"),
            state:      dir.path().join("ckp/state.json"),
        };
        let device = Default::default();
        assert!(initialize::<TestBackend>(&mode, &SolverOptions::default(), &device).is_err());
    }

    #[test]
    fn test_fit_runs_observers_and_schedule() {
        let device = Default::default();
        let opts = SolverOptions { epochs: 3, lr: 1e-3, lr_steps: vec![1], lr_gamma: 0.5, ..Default::default() };
        let init = initialize::<TestBackend>(&InitMode::Fresh(tiny_net()), &opts, &device).unwrap();
        assert_eq!(init.initial_epoch, 0);

        let solver = Solver::new(init, &opts, device, LogContext::new("fit")).with_progress(false);
        let recorder = std::rc::Rc::new(std::cell::RefCell::new(HookLog::default()));
        let mut observers: Vec<Box<dyn EpochEndObserver<TestBackend, _>>> = vec![Box::new(recorder.clone())];
        let mut data = FlatBatches { batches: 2, shuffles: 0 };

        solver.fit(&mut data, &mut observers).unwrap();

        let seen = &recorder.borrow().seen;
        let epochs: Vec<usize> = seen.iter().map(|(e, _)| *e).collect();
        assert_eq!(epochs, vec![0, 1, 2]);
        assert!((seen[0].1.lr - 1e-3).abs() < 1e-12);
        assert!((seen[1].1.lr - 5e-4).abs() < 1e-12);
        assert!((seen[2].1.lr - 5e-4).abs() < 1e-12);
        assert!(seen.iter().all(|(_, m)| m.train_loss.is_finite()));
        assert_eq!(data.shuffles, 3);
    }
}
