// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Three subcommands: `train`, `evaluate` and `convert`.
//
// Hyperparameters live in the JSON option file; the flags here
// only pick the file, the backend, and the few switches that
// are commonly flipped between runs of the same experiment.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::application::train_use_case::TrainConfig;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train (or resume, or fine-tune with QAT) an SR model
    Train(TrainArgs),

    /// Average validation PSNR of a saved checkpoint
    Evaluate(EvalArgs),

    /// Convert an image directory into the decoded cache
    Convert(ConvertArgs),
}

/// Compute backend for the network.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    NdArray,
    Wgpu,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON option file
    #[arg(long)]
    pub config: PathBuf,

    /// Continue from the experiment's last checkpoint
    #[arg(long)]
    pub resume: bool,

    /// Quantization-aware training from solver.qat_path
    #[arg(long)]
    pub qat: bool,

    /// Override solver.epochs
    #[arg(long)]
    pub epochs: Option<usize>,

    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    pub backend: BackendKind,
}

impl TrainArgs {
    /// Apply command-line switches on top of the file.
    pub fn apply(&self, cfg: &mut TrainConfig) {
        if self.resume {
            cfg.solver.resume = true;
        }
        if self.qat {
            cfg.solver.qat = true;
        }
        if let Some(epochs) = self.epochs {
            cfg.solver.epochs = epochs;
        }
    }
}

#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Option file of the run, usually `<root>/train_config.json`
    #[arg(long)]
    pub config: PathBuf,

    /// Checkpoint stem; defaults to `<root>/ckp/model`
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    pub backend: BackendKind,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Directory of png/jpg images
    #[arg(long)]
    pub dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_flags_override_config() {
        let cli = Cli::try_parse_from([
            "sr-qat-trainer", "train", "--config", "opt.json", "--resume", "--epochs", "7", "--backend", "nd-array",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        assert_eq!(args.backend, BackendKind::NdArray);

        let json = crate::application::train_use_case::tests::config_json(
            std::path::Path::new("/data"),
            std::path::Path::new("/exp"),
        );
        let mut cfg: TrainConfig = serde_json::from_str(&json).unwrap();
        args.apply(&mut cfg);
        assert!(cfg.solver.resume);
        assert!(!cfg.solver.qat);
        assert_eq!(cfg.solver.epochs, 7);
    }

    #[test]
    fn test_evaluate_defaults() {
        let cli = Cli::try_parse_from(["sr-qat-trainer", "evaluate", "--config", "exp/train_config.json"]).unwrap();
        let Commands::Evaluate(args) = cli.command else { panic!("expected evaluate") };
        assert_eq!(args.backend, BackendKind::Wgpu);
        assert!(args.checkpoint.is_none());
    }
}
