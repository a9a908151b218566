// ============================================================
// Layer 4 — Patch Sampler
// ============================================================
// Serves numbered batches to the training loop.
//
// Train split:
//   len() = floor(samples * enlarge_times / batch_size)
//   item i = samples [i*bs, i*bs+bs) taken modulo the index,
//            each cropped to a random patch and augmented.
//   One epoch therefore cycles the index `enlarge_times`
//   times; the final partial batch is dropped.
//
// Eval split:
//   len() = samples, item i = full image pair with a leading
//   batch dimension of 1.
//
// Samples of a training batch are loaded on a rayon pool,
// but get_item only returns once the whole batch is built,
// and shuffle() needs `&mut self`, so the index can never be
// reordered under a batch that is still being assembled.

use anyhow::{bail, Context, Result};
use image::RgbImage;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data::{
    cache::{ensure_cache, read_image, CACHE_EXT},
    manifest::load_manifest,
    patch::{augment, get_patch, PatchPair},
};
use crate::domain::{
    image::{ImageBatch, Split, CHANNELS},
    traits::BatchSource,
};

// ─── Options ──────────────────────────────────────────────────────────────────
/// One dataset section of the training config.
/// Field names follow the JSON option files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetOptions {
    #[serde(rename = "dataroot_HR")]
    pub dataroot_hr:   PathBuf,
    #[serde(rename = "dataroot_LR")]
    pub dataroot_lr:   PathBuf,
    pub filename_path: PathBuf,
    pub scale:         usize,
    pub split:         Split,
    #[serde(default = "default_patch_size")]
    pub patch_size:    usize,
    #[serde(default = "default_batch_size")]
    pub batch_size:    usize,
    #[serde(default)]
    pub flip:          bool,
    #[serde(default)]
    pub rot:           bool,
    #[serde(default = "default_enlarge_times")]
    pub enlarge_times: usize,
}

fn default_patch_size() -> usize { 64 }
fn default_batch_size() -> usize { 16 }
fn default_enlarge_times() -> usize { 1 }

// ─── PatchSampler ─────────────────────────────────────────────────────────────
pub struct PatchSampler {
    opts:  DatasetOptions,
    index: Vec<String>,
    pool:  Option<rayon::ThreadPool>,
}

impl PatchSampler {
    /// Convert both data roots to the image cache (rewriting the
    /// options to point at it) and load the manifest.
    pub fn new(mut opts: DatasetOptions, workers: usize) -> Result<Self> {
        ensure_cache(&mut opts.dataroot_hr)?;
        ensure_cache(&mut opts.dataroot_lr)?;
        let index = load_manifest(&opts.filename_path)?;
        tracing::info!(
            "{:?} split: {} samples from '{}'",
            opts.split,
            index.len(),
            opts.filename_path.display()
        );
        Self::from_index(opts, index, workers)
    }

    /// Build a sampler over an explicit index, with no cache conversion.
    pub fn from_index(opts: DatasetOptions, index: Vec<String>, workers: usize) -> Result<Self> {
        if opts.split == Split::Train && opts.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        let pool = if workers > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .context("Cannot start data loading workers")?,
            )
        } else {
            None
        };
        Ok(Self { opts, index, pool })
    }

    pub fn options(&self) -> &DatasetOptions {
        &self.opts
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    /// Number of items (batches in train mode, images in eval mode).
    pub fn length(&self) -> usize {
        match self.opts.split {
            Split::Train => self.index.len() * self.opts.enlarge_times / self.opts.batch_size,
            Split::Eval  => self.index.len(),
        }
    }

    /// New random order for the next epoch. Eval order is fixed.
    pub fn shuffle(&mut self) {
        if self.opts.split == Split::Train {
            self.index.shuffle(&mut rand::thread_rng());
        }
    }

    pub fn get_item(&self, idx: usize) -> Result<ImageBatch> {
        match self.opts.split {
            Split::Train => self.train_batch(idx),
            Split::Eval  => self.eval_batch(idx),
        }
    }

    fn train_batch(&self, idx: usize) -> Result<ImageBatch> {
        let n = self.index.len();
        if n == 0 {
            bail!("Cannot build a batch from an empty manifest");
        }
        let start = idx * self.opts.batch_size;
        let end   = start + self.opts.batch_size;

        let pairs: Vec<PatchPair> = match &self.pool {
            Some(pool) => pool.install(|| {
                (start..end)
                    .into_par_iter()
                    .map(|i| self.train_pair(i % n))
                    .collect::<Result<Vec<_>>>()
            })?,
            None => (start..end)
                .map(|i| self.train_pair(i % n))
                .collect::<Result<Vec<_>>>()?,
        };

        let ps = self.opts.patch_size;
        let hs = ps * self.opts.scale;
        let bs = pairs.len();
        let mut lr = Vec::with_capacity(bs * ps * ps * CHANNELS);
        let mut hr = Vec::with_capacity(bs * hs * hs * CHANNELS);
        for pair in &pairs {
            lr.extend(pair.lr.as_raw().iter().map(|&v| v as f32));
            hr.extend(pair.hr.as_raw().iter().map(|&v| v as f32));
        }

        Ok(ImageBatch {
            lr,
            lr_dims: [bs, ps, ps, CHANNELS],
            hr,
            hr_dims: [bs, hs, hs, CHANNELS],
        })
    }

    fn eval_batch(&self, idx: usize) -> Result<ImageBatch> {
        if idx >= self.index.len() {
            bail!("Eval index {idx} out of range ({} samples)", self.index.len());
        }
        let (lr, hr) = self.load_pair(idx)?;
        Ok(ImageBatch {
            lr_dims: dims_of(&lr),
            hr_dims: dims_of(&hr),
            lr:      to_floats(&lr),
            hr:      to_floats(&hr),
        })
    }

    fn train_pair(&self, idx: usize) -> Result<PatchPair> {
        let (lr, hr) = self.load_pair(idx)?;
        let mut rng = rand::thread_rng();
        let pair = get_patch(
            &lr,
            &hr,
            self.opts.patch_size as u32,
            self.opts.scale as u32,
            &mut rng,
        )
        .with_context(|| format!("Sample '{}'", self.index[idx]))?;
        Ok(augment(pair, self.opts.flip, self.opts.rot, &mut rng))
    }

    /// Read the (LR, HR) images for sample `idx`. The HR file uses
    /// the manifest name as-is; the LR file is `<stem>.pt`.
    fn load_pair(&self, idx: usize) -> Result<(RgbImage, RgbImage)> {
        let name = &self.index[idx];
        let stem = Path::new(name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());

        let hr_path = self.opts.dataroot_hr.join(name);
        let lr_path = self.opts.dataroot_lr.join(format!("{stem}.{CACHE_EXT}"));
        Ok((read_image(&lr_path)?, read_image(&hr_path)?))
    }
}

impl BatchSource for PatchSampler {
    fn len(&self) -> usize {
        self.length()
    }

    fn batch(&self, index: usize) -> Result<ImageBatch> {
        self.get_item(index)
    }

    fn shuffle(&mut self) {
        PatchSampler::shuffle(self)
    }
}

fn dims_of(img: &RgbImage) -> [usize; 4] {
    [1, img.height() as usize, img.width() as usize, CHANNELS]
}

fn to_floats(img: &RgbImage) -> Vec<f32> {
    img.as_raw().iter().map(|&v| v as f32).collect()
}
