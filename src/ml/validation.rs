// ============================================================
// Layer 5 — Validation & Checkpoint Controller
// ============================================================
// Runs at the end of every epoch, after the optimizer steps:
//
//   1. reshuffle the training sampler (always)
//   2. skip unless epoch % val_step == 0
//   3. average PSNR over the validation split on the inner
//      (non-autodiff) backend
//   4. overwrite model + optimizer + meta checkpoint
//   5. persist TrainingState when PSNR ties or beats the best
//   6. log one summary line and record train_loss / val_psnr
//
// PSNR (dB), on images rounded and clipped to [0, 255]:
//   PSNR = 20 · log10(255 / √MSE)
// with a 1 px border crop and a crop to the shared size.
//
// Reference: Burn Book §5 (model.valid())

use anyhow::{Context, Result};
use burn::{module::AutodiffModule, optim::Optimizer, prelude::*, tensor::backend::AutodiffBackend};

use crate::data::batcher::{to_images, SrBatcher};
use crate::domain::{
    image::{FloatImage, CHANNELS},
    state::TrainingState,
    traits::{BatchSource, MetricsSink},
};
use crate::infra::{
    checkpoint::{CheckpointManager, CheckpointMeta},
    logging::LogContext,
    progress::Progress,
};
use crate::ml::{
    loss::LossKind,
    model::SrNet,
    solver::{EpochContext, EpochEndObserver},
};

/// Returned when the prediction matches the target exactly.
pub const PSNR_CAP: f64 = 100.0;

// ─── PSNR ─────────────────────────────────────────────────────────────────────
/// PSNR between a prediction and its target.
///
/// Both images drop a 1 px border measured on the prediction:
/// rows `1..sr.height-1` and columns `1..sr.width-1`, clipped
/// to whatever the target actually has. A target smaller than
/// the prediction therefore keeps its own last row and column.
/// The two regions are then cut to their shared size.
///
/// A comparison region that is empty after cropping scores 0.0.
pub fn calc_psnr(sr: &FloatImage, hr: &FloatImage) -> f64 {
    let h = crop_len(sr.height, sr.height).min(crop_len(sr.height, hr.height));
    let w = crop_len(sr.width, sr.width).min(crop_len(sr.width, hr.width));
    if h == 0 || w == 0 {
        tracing::warn!(
            "PSNR on empty region: {}x{} vs {}x{}",
            sr.height, sr.width, hr.height, hr.width
        );
        return 0.0;
    }

    let quantize = |v: f32| (v as f64).round().clamp(0.0, 255.0);
    let mut sum = 0.0f64;
    for y in 1..=h {
        for x in 1..=w {
            for c in 0..CHANNELS {
                let d = quantize(sr.at(y, x, c)) - quantize(hr.at(y, x, c));
                sum += d * d;
            }
        }
    }
    let mse = sum / (h * w * CHANNELS) as f64;
    if mse == 0.0 {
        return PSNR_CAP;
    }
    20.0 * (255.0 / mse.sqrt()).log10()
}

/// Length of `1..pred_len-1` within a dimension of size `len`.
fn crop_len(pred_len: usize, len: usize) -> usize {
    pred_len.saturating_sub(1).min(len).saturating_sub(1)
}

fn round4(v: f64) -> f64 {
    (v * 1e4).round() / 1e4
}

// ─── Validation Pass ──────────────────────────────────────────────────────────
/// Average PSNR of `model` over every batch of `data`.
pub fn validate<B: Backend>(
    model:    &SrNet<B>,
    data:     &dyn BatchSource,
    device:   &B::Device,
    progress: &Progress,
) -> Result<f64> {
    let batcher = SrBatcher::<B>::new(device.clone());
    let mut total = 0.0f64;
    let mut count = 0usize;

    for index in 0..data.len() {
        let item  = data.batch(index).with_context(|| format!("Cannot load validation sample {index}"))?;
        let batch = batcher.batch(&item);
        let preds = to_images(model.forward(batch.lr))?;
        for (sr, hr) in preds.iter().zip(item.hr_images()) {
            total += calc_psnr(sr, &hr);
            count += 1;
        }
        progress.inc();
    }
    progress.finish();

    Ok(if count == 0 { 0.0 } else { total / count as f64 })
}

// ─── CheckpointController ─────────────────────────────────────────────────────
pub struct CheckpointController {
    val_data:      Box<dyn BatchSource>,
    sink:          Box<dyn MetricsSink>,
    checkpoint:    CheckpointManager,
    state:         TrainingState,
    val_step:      usize,
    loss:          LossKind,
    log:           LogContext,
    show_progress: bool,
}

impl CheckpointController {
    pub fn new(
        val_data:   Box<dyn BatchSource>,
        sink:       Box<dyn MetricsSink>,
        checkpoint: CheckpointManager,
        state:      TrainingState,
        val_step:   usize,
        loss:       LossKind,
        log:        LogContext,
    ) -> Self {
        Self {
            val_data,
            sink,
            checkpoint,
            state,
            val_step: val_step.max(1),
            loss,
            log,
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }
}

impl<B, O> EpochEndObserver<B, O> for CheckpointController
where
    B: AutodiffBackend,
    O: Optimizer<SrNet<B>, B>,
{
    fn on_epoch_end(&mut self, ctx: EpochContext<'_, B, O>) -> Result<()> {
        let _run = self.log.enter();

        ctx.train_data.shuffle();
        if ctx.epoch % self.val_step != 0 {
            return Ok(());
        }

        // model.valid() → SrNet<B::InnerBackend>, no graph tracking
        let model  = ctx.model.valid();
        let device = model
            .devices()
            .into_iter()
            .next()
            .context("Model has no parameters to locate a device")?;
        let bar = if self.show_progress {
            Progress::new(self.val_data.len(), "Validation...")
        } else {
            Progress::hidden(self.val_data.len())
        };

        let psnr = round4(validate(&model, self.val_data.as_ref(), &device, &bar)?);
        let loss = round4(ctx.metrics.train_loss);

        let meta = CheckpointMeta { epoch: ctx.epoch, learning_rate: ctx.metrics.lr, loss: self.loss };
        self.checkpoint.save_model(ctx.model, ctx.optim, &meta)?;

        if self.state.promote(ctx.epoch, psnr) {
            self.checkpoint.save_state(&self.state)?;
        }

        tracing::info!(
            "Epoch: {:4} | PSNR: {:.2} | Loss: {:.4} | Best_PSNR: {:.2} in Epoch [{}]",
            ctx.epoch, psnr, loss, self.state.best_psnr, self.state.best_epoch
        );

        self.sink.add_scalar("train_loss", loss, ctx.epoch)?;
        self.sink.add_scalar("val_psnr", psnr, ctx.epoch)?;
        Ok(())
    }
}
