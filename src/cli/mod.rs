// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and routes each subcommand to its
// use case. Also the only place that installs the tracing
// subscriber, because `train` logs into the experiment folder.
//
//   1. `train`    — fit a model from a JSON option file
//   2. `evaluate` — PSNR of a saved checkpoint
//   3. `convert`  — prebuild the image cache for a directory
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use burn::backend::{wgpu::WgpuDevice, Autodiff, NdArray, Wgpu};
use clap::Parser;
use commands::{BackendKind, Commands, ConvertArgs, EvalArgs, TrainArgs};

use crate::application::{
    eval_use_case::EvalUseCase,
    train_use_case::{ExperimentPaths, TrainConfig, TrainUseCase},
};
use crate::data::cache::ensure_cache;
use crate::infra::logging::init_tracing;

#[derive(Parser, Debug)]
#[command(
    name = "sr-qat-trainer",
    version = "0.1.0",
    about = "Train super-resolution models with resumable checkpoints and quantization-aware training."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
            Commands::Convert(args)  => run_convert(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let mut cfg = TrainConfig::load(&args.config)?;
    args.apply(&mut cfg);

    let paths = ExperimentPaths::new(&cfg.paths.root);
    init_tracing(Some(&paths.log))?;
    tracing::info!("Starting '{}' from '{}' on {:?}", cfg.name, args.config.display(), args.backend);

    let use_case = TrainUseCase::new(cfg);
    let state = match args.backend {
        BackendKind::NdArray => use_case.execute::<Autodiff<NdArray>>(Default::default())?,
        BackendKind::Wgpu    => use_case.execute::<Autodiff<Wgpu>>(WgpuDevice::default())?,
    };

    println!(
        "Training complete. Best PSNR {:.2} dB in epoch {}.",
        state.best_psnr, state.best_epoch
    );
    Ok(())
}

fn run_evaluate(args: EvalArgs) -> Result<()> {
    init_tracing(None)?;
    let cfg = TrainConfig::load(&args.config)?;

    let use_case = EvalUseCase::new(cfg, args.checkpoint);
    let psnr = match args.backend {
        BackendKind::NdArray => use_case.execute::<NdArray>(Default::default())?,
        BackendKind::Wgpu    => use_case.execute::<Wgpu>(WgpuDevice::default())?,
    };

    println!("PSNR: {psnr:.4} dB");
    Ok(())
}

fn run_convert(args: ConvertArgs) -> Result<()> {
    init_tracing(None)?;
    let mut root = args.dir;
    let converted = ensure_cache(&mut root)?;

    if converted {
        println!("Cache written to '{}'", root.display());
    } else {
        println!("Cache already present at '{}'", root.display());
    }
    Ok(())
}
