// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a DPO fine-tuning run in order:
//
//   Step 1: Validate the configuration
//   Step 2: Load preference pairs        (Layer 4 - data)
//   Step 3: Open the metrics CSV         (Layer 6 - infra)
//   Step 4: Run the DPO training loop    (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::data::synthetic::SyntheticPreferences;
use crate::domain::traits::PreferenceSource;
use crate::infra::metrics::MetricsLogger;
use crate::ml::loss::{DpoLossConfig, DpoLossType};
use crate::ml::model::TransformerLmConfig;
use crate::ml::trainer::{run_training, TrainingSummary};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// #[serde(default)] lets a JSON config file name only the fields
// it wants to change; everything else keeps the default below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    pub seed:             u64,
    pub epochs:           usize,
    pub batch_size:       usize,
    pub lr:               f64,
    pub weight_decay:     f64,
    /// Per-parameter L2 clipping threshold; 0 disables clipping.
    pub max_grad_norm:    f64,

    // DPO objective
    pub beta:             f64,
    pub loss_type:        DpoLossType,
    pub label_smoothing:  f64,
    pub reference_free:   bool,

    // Policy / reference architecture
    pub vocab_size:       usize,
    pub max_seq_len:      usize,
    pub d_model:          usize,
    pub num_heads:        usize,
    pub num_layers:       usize,
    pub d_ff:             usize,
    pub dropout:          f64,

    // Synthetic preference data
    pub num_pairs:        usize,
    pub max_prompt_len:   usize,
    pub max_response_len: usize,

    // Reporting
    pub log_every:        usize,
    pub metrics_dir:      Option<String>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            seed:             42,
            epochs:           3,
            batch_size:       8,
            lr:               1e-3,
            weight_decay:     0.01,
            max_grad_norm:    1.0,
            beta:             0.1,
            loss_type:        DpoLossType::Sigmoid,
            label_smoothing:  0.0,
            reference_free:   false,
            vocab_size:       32,
            max_seq_len:      16,
            d_model:          64,
            num_heads:        4,
            num_layers:       2,
            d_ff:             128,
            // Dropout makes the policy disagree with the reference on
            // identical weights, so it stays off unless asked for.
            dropout:          0.0,
            num_pairs:        256,
            max_prompt_len:   4,
            max_response_len: 6,
            log_every:        10,
            metrics_dir:      None,
        }
    }
}

impl TrainConfig {
    pub fn loss_config(&self) -> DpoLossConfig {
        DpoLossConfig::new(self.beta)
            .with_loss_type(self.loss_type)
            .with_label_smoothing(self.label_smoothing)
            .with_reference_free(self.reference_free)
    }

    pub fn model_config(&self) -> TransformerLmConfig {
        TransformerLmConfig::new(
            self.vocab_size, self.max_seq_len, self.d_model,
            self.num_heads, self.num_layers, self.d_ff, self.dropout,
        )
    }

    /// Reject settings that would panic deep inside Burn.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.epochs > 0, "epochs must be positive");
        ensure!(self.batch_size > 0, "batch_size must be positive");
        ensure!(self.log_every > 0, "log_every must be positive");
        ensure!(self.lr.is_finite() && self.lr > 0.0, "lr must be positive, got {}", self.lr);
        ensure!(self.weight_decay.is_finite() && self.weight_decay >= 0.0,
            "weight_decay must be non-negative, got {}", self.weight_decay);
        ensure!(self.max_grad_norm.is_finite() && self.max_grad_norm >= 0.0,
            "max_grad_norm must be non-negative, got {}", self.max_grad_norm);
        ensure!(self.num_pairs > 0, "num_pairs must be positive");
        ensure!(self.num_heads > 0 && self.d_model % self.num_heads == 0,
            "d_model ({}) must be divisible by num_heads ({})", self.d_model, self.num_heads);
        ensure!((0.0..1.0).contains(&self.dropout), "dropout must be in [0, 1), got {}", self.dropout);
        ensure!(
            self.max_prompt_len + self.max_response_len <= self.max_seq_len,
            "max_prompt_len + max_response_len ({}) exceeds max_seq_len ({})",
            self.max_prompt_len + self.max_response_len,
            self.max_seq_len
        );
        self.loss_config().validate()?;
        Ok(())
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training run end to end
    pub fn execute(&self) -> Result<TrainingSummary> {
        let cfg = &self.config;

        // ── Step 1: Validate ──────────────────────────────────────────────────
        cfg.validate()?;

        // ── Step 2: Preference pairs ──────────────────────────────────────────
        let source = SyntheticPreferences::new(
            cfg.num_pairs,
            cfg.max_prompt_len,
            cfg.max_response_len,
            cfg.vocab_size,
            cfg.seed,
        );
        let pairs = source.load_pairs()?;
        tracing::info!("Loaded {} preference pairs", pairs.len());

        // ── Step 3: Metrics CSV (optional) ────────────────────────────────────
        let metrics = cfg
            .metrics_dir
            .as_deref()
            .map(MetricsLogger::new)
            .transpose()?;
        if let Some(logger) = &metrics {
            tracing::info!("Writing metrics to '{}'", logger.csv_path().display());
        }

        // ── Step 4: Run DPO training (Layer 5) ────────────────────────────────
        run_training(cfg, pairs, metrics.as_ref())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TrainConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        let bad_heads = TrainConfig { num_heads: 3, ..Default::default() };
        assert!(bad_heads.validate().is_err());

        let too_long = TrainConfig { max_prompt_len: 12, ..Default::default() };
        assert!(too_long.validate().is_err());

        let bad_beta = TrainConfig { beta: 0.0, ..Default::default() };
        assert!(bad_beta.validate().is_err());

        let empty_batch = TrainConfig { batch_size: 0, ..Default::default() };
        assert!(empty_batch.validate().is_err());

        let negative_decay = TrainConfig { weight_decay: -0.1, ..Default::default() };
        assert!(negative_decay.validate().is_err());

        let nan_clip = TrainConfig { max_grad_norm: f64::NAN, ..Default::default() };
        assert!(nan_clip.validate().is_err());

        let no_clip = TrainConfig { max_grad_norm: 0.0, ..Default::default() };
        assert!(no_clip.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg: TrainConfig = serde_json::from_str(r#"{ "beta": 0.25, "loss_type": "hinge" }"#).unwrap();
        assert_eq!(cfg.beta, 0.25);
        assert_eq!(cfg.loss_type, DpoLossType::Hinge);
        assert_eq!(cfg.batch_size, TrainConfig::default().batch_size);
    }

    #[test]
    fn test_loss_config_carries_dpo_settings() {
        let cfg = TrainConfig {
            beta: 0.3,
            label_smoothing: 0.1,
            reference_free: true,
            ..Default::default()
        };
        let loss = cfg.loss_config();
        assert_eq!(loss.beta, 0.3);
        assert_eq!(loss.label_smoothing, 0.1);
        assert!(loss.reference_free);
    }

    #[test]
    fn test_execute_small_run() {
        let cfg = TrainConfig {
            epochs:     1,
            batch_size: 4,
            num_pairs:  8,
            d_model:    16,
            num_heads:  2,
            num_layers: 1,
            d_ff:       32,
            ..Default::default()
        };
        let summary = TrainUseCase::new(cfg).execute().unwrap();
        assert_eq!(summary.steps, 2);
        assert!(summary.final_metrics.loss.is_finite());
    }
}
