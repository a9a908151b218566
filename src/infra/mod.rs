// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns that don't belong in any specific
// business layer:
//
//   checkpoint.rs — model, optimizer and meta records plus the
//                   training state JSON, under one model path
//
//   metrics.rs    — scalar series (train_loss, val_psnr) to a
//                   CSV file, or kept in memory for tests
//
//   logging.rs    — tracing subscriber setup and the per-run
//                   LogContext span
//
//   progress.rs   — indicatif bars for conversion, training
//                   and validation
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Checkpoint saving and loading
pub mod checkpoint;

/// Training metrics sinks
pub mod metrics;

/// Subscriber setup and run spans
pub mod logging;

/// Terminal progress bars
pub mod progress;
