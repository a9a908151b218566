// ============================================================
// Layer 4 — Image Cache
// ============================================================
// Decoding PNG/JPEG on every training step is slow, so each
// data root is converted once into a sibling directory of
// pre-decoded RGB8 buffers:
//
//   data/train_HR/0001.png   →   data/train_HR_pt/0001.pt
//
// Each `.pt` file is a bincode-serialised CachedImage
// (width, height, row-major HWC bytes). The round trip is
// lossless, bit for bit.
//
// Idempotence is decided by entry count only: if the cache
// directory already holds as many entries as the source, it
// is reused without looking inside. A half-written cache
// with the right count would be served as-is, so conversion
// aborts on the first bad image instead of skipping it.

use anyhow::{Context, Result};
use image::RgbImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use crate::infra::progress::Progress;

/// Extension of cached image files
pub const CACHE_EXT: &str = "pt";

/// Suffix appended to a data root to name its cache directory
pub const CACHE_DIR_SUFFIX: &str = "_pt";

/// A decoded RGB8 image in serialisable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedImage {
    pub width:  u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl From<RgbImage> for CachedImage {
    fn from(img: RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self { width, height, pixels: img.into_raw() }
    }
}

impl CachedImage {
    pub fn into_rgb(self) -> Result<RgbImage> {
        let (w, h) = (self.width, self.height);
        RgbImage::from_raw(w, h, self.pixels)
            .with_context(|| format!("Cached buffer does not match {w}x{h} RGB"))
    }
}

/// Decode any supported image file to RGB8.
/// Grayscale and alpha inputs are normalised to plain RGB.
pub fn decode_rgb(path: &Path) -> Result<RgbImage> {
    let img = image::open(path)
        .with_context(|| format!("Cannot decode image '{}'", path.display()))?;
    Ok(img.to_rgb8())
}

pub fn write_cached(img: &RgbImage, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Cannot create cache file '{}'", path.display()))?;
    let cached = CachedImage::from(img.clone());
    bincode::serialize_into(BufWriter::new(file), &cached)
        .with_context(|| format!("Cannot serialise '{}'", path.display()))?;
    Ok(())
}

pub fn read_cached(path: &Path) -> Result<RgbImage> {
    let file = File::open(path)
        .with_context(|| format!("Cannot open cache file '{}'", path.display()))?;
    let cached: CachedImage = bincode::deserialize_from(BufReader::new(file))
        .with_context(|| format!("Corrupt cache file '{}'", path.display()))?;
    cached.into_rgb()
}

/// Read a sample from either a cache file or a regular image.
pub fn read_image(path: &Path) -> Result<RgbImage> {
    if has_cache_ext(path) {
        read_cached(path)
    } else {
        decode_rgb(path)
    }
}

fn has_cache_ext(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(CACHE_EXT)
}

/// Make sure `root` points at a cached directory, converting
/// it first if needed. Returns true if a conversion ran.
///
/// `root` is rewritten to the cache directory whenever one is
/// used, so the caller's configuration follows the cache from
/// then on.
pub fn ensure_cache(root: &mut PathBuf) -> Result<bool> {
    // Rebuilding from components drops any trailing separator
    let src: PathBuf = root.components().collect();
    let entries = list_entries(&src)?;

    if entries.iter().all(|name| has_cache_ext(Path::new(name))) {
        *root = src;
        return Ok(false);
    }

    let cache_dir = cache_dir_for(&src)?;
    if cache_dir.is_dir() {
        let cached = fs::read_dir(&cache_dir)
            .with_context(|| format!("Cannot read directory '{}'", cache_dir.display()))?
            .count();
        if cached == entries.len() {
            tracing::info!("Reusing image cache '{}' ({} files)", cache_dir.display(), cached);
            *root = cache_dir;
            return Ok(false);
        }
    }

    fs::create_dir_all(&cache_dir)
        .with_context(|| format!("Cannot create '{}'", cache_dir.display()))?;
    tracing::info!(
        "Converting {} images from '{}' into '{}'",
        entries.len(),
        src.display(),
        cache_dir.display()
    );

    let progress = Progress::new(entries.len(), "caching");
    entries.par_iter().try_for_each(|name| -> Result<()> {
        let src_path = src.join(name);
        let stem = Path::new(name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        let dst_path = cache_dir.join(format!("{stem}.{CACHE_EXT}"));

        let img = decode_rgb(&src_path)?;
        write_cached(&img, &dst_path)?;
        progress.inc();
        Ok(())
    })?;
    progress.finish();

    *root = cache_dir;
    Ok(true)
}

/// `<parent>/<name>_pt` for a root `<parent>/<name>`
pub fn cache_dir_for(src: &Path) -> Result<PathBuf> {
    let name = src
        .file_name()
        .with_context(|| format!("Data root '{}' has no directory name", src.display()))?;
    Ok(src.with_file_name(format!("{}{}", name.to_string_lossy(), CACHE_DIR_SUFFIX)))
}

fn list_entries(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
    {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}
