// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `init-config`.
//
// Every training flag is optional. Unset flags leave the value
// from `--config` (or the built-in default) untouched, so the
// layering is: defaults → JSON file → command line.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::train_use_case::TrainConfig;
use crate::ml::loss::DpoLossType;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run DPO on synthetic preference pairs
    Train(TrainArgs),

    /// Write the default training configuration as JSON
    InitConfig(InitConfigArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON config file; flags below override its values
    #[arg(long)]
    pub config: Option<String>,

    /// Number of full passes over the preference pairs
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Preference pairs per optimizer step
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// AdamW learning rate
    #[arg(long)]
    pub lr: Option<f64>,

    /// AdamW decoupled weight decay
    #[arg(long)]
    pub weight_decay: Option<f64>,

    /// Clip each parameter's gradient to this L2 norm (0 disables)
    #[arg(long)]
    pub max_grad_norm: Option<f64>,

    /// Inverse temperature of the implicit reward; larger keeps the
    /// policy closer to the reference
    #[arg(long)]
    pub beta: Option<f64>,

    /// sigmoid | ipo | hinge
    #[arg(long)]
    pub loss_type: Option<DpoLossType>,

    /// Assumed probability that a preference label is flipped (sigmoid only)
    #[arg(long)]
    pub label_smoothing: Option<f64>,

    /// Treat the reference log-probs as zero. A bare flag means true;
    /// `--reference-free false` overrides a config file.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub reference_free: Option<bool>,

    /// Number of synthetic preference pairs
    #[arg(long)]
    pub num_pairs: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory for metrics.csv
    #[arg(long)]
    pub metrics_dir: Option<String>,

    /// Log every N optimizer steps
    #[arg(long)]
    pub log_every: Option<usize>,

    // Model shape
    #[arg(long)]
    pub vocab_size: Option<usize>,

    #[arg(long)]
    pub max_seq_len: Option<usize>,

    /// Hidden dimension; must be divisible by --num-heads
    #[arg(long)]
    pub d_model: Option<usize>,

    #[arg(long)]
    pub num_heads: Option<usize>,

    #[arg(long)]
    pub num_layers: Option<usize>,

    #[arg(long)]
    pub d_ff: Option<usize>,

    #[arg(long)]
    pub dropout: Option<f64>,
}

impl TrainArgs {
    /// Overlay the flags that were given on top of `base`.
    pub fn apply(self, base: TrainConfig) -> TrainConfig {
        TrainConfig {
            epochs:          self.epochs.unwrap_or(base.epochs),
            batch_size:      self.batch_size.unwrap_or(base.batch_size),
            lr:              self.lr.unwrap_or(base.lr),
            weight_decay:    self.weight_decay.unwrap_or(base.weight_decay),
            max_grad_norm:   self.max_grad_norm.unwrap_or(base.max_grad_norm),
            beta:            self.beta.unwrap_or(base.beta),
            loss_type:       self.loss_type.unwrap_or(base.loss_type),
            label_smoothing: self.label_smoothing.unwrap_or(base.label_smoothing),
            reference_free:  self.reference_free.unwrap_or(base.reference_free),
            num_pairs:       self.num_pairs.unwrap_or(base.num_pairs),
            seed:            self.seed.unwrap_or(base.seed),
            metrics_dir:     self.metrics_dir.or(base.metrics_dir),
            log_every:       self.log_every.unwrap_or(base.log_every),
            vocab_size:      self.vocab_size.unwrap_or(base.vocab_size),
            max_seq_len:     self.max_seq_len.unwrap_or(base.max_seq_len),
            d_model:         self.d_model.unwrap_or(base.d_model),
            num_heads:       self.num_heads.unwrap_or(base.num_heads),
            num_layers:      self.num_layers.unwrap_or(base.num_layers),
            d_ff:            self.d_ff.unwrap_or(base.d_ff),
            dropout:         self.dropout.unwrap_or(base.dropout),
            ..base
        }
    }
}

/// Arguments for the `init-config` command
#[derive(Args, Debug)]
pub struct InitConfigArgs {
    /// Where to write the JSON file
    #[arg(long, default_value = "dpo_config.json")]
    pub out: String,
}
