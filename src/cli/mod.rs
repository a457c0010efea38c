// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses the command line with clap and hands off to Layer 2.
//
//   1. `train`       — runs DPO and prints a summary
//   2. `init-config` — writes the default config for editing
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, InitConfigArgs, TrainArgs};

use crate::application::train_use_case::{TrainConfig, TrainUseCase};
use crate::infra::config_store::ConfigStore;

#[derive(Parser, Debug)]
#[command(
    name = "dpo-train",
    version = "0.1.0",
    about = "Fine-tune a small causal transformer with Direct Preference Optimization."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)      => run_train(args),
            Commands::InitConfig(args) => run_init_config(args),
        }
    }
}

/// Resolve defaults → `--config` file → flags.
fn resolve_config(args: TrainArgs) -> Result<TrainConfig> {
    let base = match args.config.as_deref() {
        Some(path) => {
            tracing::info!("Loading config from '{}'", path);
            ConfigStore::load(path)?
        }
        None => TrainConfig::default(),
    };
    Ok(args.apply(base))
}

fn run_train(args: TrainArgs) -> Result<()> {
    let cfg = resolve_config(args)?;
    tracing::info!(
        "Starting DPO: loss={} beta={} epochs={} batch_size={} lr={}",
        cfg.loss_type, cfg.beta, cfg.epochs, cfg.batch_size, cfg.lr
    );

    let summary = TrainUseCase::new(cfg).execute()?;
    let m = &summary.final_metrics;

    println!("\nTraining finished after {} steps", summary.steps);
    println!("  first loss      : {:.4}", summary.first_loss);
    println!("  final loss      : {:.4}", m.loss);
    println!("  chosen reward   : {:+.4}", m.chosen_reward);
    println!("  rejected reward : {:+.4}", m.rejected_reward);
    println!("  reward margin   : {:+.4}", m.reward_margin);
    println!("  reward accuracy : {:.1}%", m.accuracy * 100.0);
    Ok(())
}

fn run_init_config(args: InitConfigArgs) -> Result<()> {
    ConfigStore::save(&args.out, &TrainConfig::default())?;
    println!("Wrote default config to '{}'", args.out);
    Ok(())
}
