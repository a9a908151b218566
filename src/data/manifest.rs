// ============================================================
// Layer 4 — Manifest Loader
// ============================================================
// A manifest is a plain text file with one sample identifier
// (a filename inside the data roots) per line, no header:
//
//   0001.pt
//   0002.pt
//   ...
//
// Surrounding whitespace is trimmed and blank lines skipped.

use anyhow::{Context, Result};
use std::{fs, path::Path};

/// Load the ordered list of sample identifiers.
pub fn load_manifest(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read manifest '{}'", path.display()))?;

    let names: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    tracing::debug!("Manifest '{}' lists {} samples", path.display(), names.len());
    Ok(names)
}
