// ============================================================
// Layer 6 — Metrics Sink
// ============================================================
// Records the scalar time series of a run to a CSV file,
// one row per value:
//
//   tag,step,value
//   train_loss,0,12.345600
//   val_psnr,0,27.812300
//
// Appending means a resumed run keeps extending the same file.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::traits::MetricsSink;

/// Appends `tag,step,value` rows to a CSV file.
pub struct CsvMetricsSink {
    csv_path: PathBuf,
}

impl CsvMetricsSink {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(csv_path: impl Into<PathBuf>) -> Result<Self> {
        let csv_path = csv_path.into();
        if let Some(dir) = csv_path.parent() {
            fs::create_dir_all(dir)?;
        }

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "tag,step,value")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

impl MetricsSink for CsvMetricsSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot append to '{}'", self.csv_path.display()))?;
        writeln!(f, "{tag},{step},{value:.6}")?;
        Ok(())
    }
}

/// Keeps every scalar in memory; handy for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryMetricsSink {
    pub records: Vec<(String, usize, f64)>,
}

impl MemoryMetricsSink {
    pub fn series(&self, tag: &str) -> Vec<(usize, f64)> {
        self.records
            .iter()
            .filter(|(t, _, _)| t == tag)
            .map(|(_, step, value)| (*step, *value))
            .collect()
    }
}

impl MetricsSink for MemoryMetricsSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        self.records.push((tag.to_string(), step, value));
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_rows_are_appended_after_header() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("metrics.csv");

        let mut sink = CsvMetricsSink::new(&path).unwrap();
        sink.add_scalar("train_loss", 1.5, 0).unwrap();
        sink.add_scalar("val_psnr", 28.25, 0).unwrap();

        // Re-opening must not rewrite the header
        let mut again = CsvMetricsSink::new(&path).unwrap();
        again.add_scalar("val_psnr", 29.0, 1).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![
            "tag,step,value",
            "train_loss,0,1.500000",
            "val_psnr,0,28.250000",
            "val_psnr,1,29.000000",
        ]);
    }

    #[test]
    fn test_memory_sink_filters_by_tag() {
        let mut sink = MemoryMetricsSink::default();
        sink.add_scalar("train_loss", 2.0, 0).unwrap();
        sink.add_scalar("val_psnr", 30.0, 0).unwrap();
        assert_eq!(sink.series("val_psnr"), vec![(0, 30.0)]);
    }
}
