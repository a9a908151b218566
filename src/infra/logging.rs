// ============================================================
// Layer 6 — Logging
// ============================================================
// Two pieces:
//
//   init_tracing  — installs the global subscriber: stdout,
//                   plus a plain-text copy in the experiment's
//                   train.log when a path is given.
//
//   LogContext    — a named span handed to the Solver and the
//                   checkpoint controller at construction.
//                   Every event they emit inside it carries the
//                   run name, so there is no global named logger.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    path::Path,
    sync::Mutex,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "sr_qat_trainer=info";

/// Install the global subscriber. Safe to call more than once;
/// later calls are ignored.
pub fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Cannot create '{}'", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file '{}'", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    // try_init fails only if a subscriber is already installed
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init();
    Ok(())
}

/// Logging context for one training run.
#[derive(Debug, Clone)]
pub struct LogContext {
    name: String,
    span: tracing::Span,
}

impl LogContext {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let span = tracing::info_span!("run", name = %name);
        Self { name, span }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enter the run span for the lifetime of the returned guard.
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}
