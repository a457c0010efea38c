// ============================================================
// Layer 5 — DPO Loss
// ============================================================
// Substituting the closed-form optimal policy into the Bradley-Terry
// preference model gives a loss over policy log-probabilities alone:
//
//   u     = β · ((log π(y_w|x) - log π_ref(y_w|x))
//               - (log π(y_l|x) - log π_ref(y_l|x)))
//   L_DPO = -mean(log σ(u))
//
// y_w is the chosen response, y_l the rejected one, π the trainable
// policy and π_ref the frozen reference. The partition function
// cancels, so no reward model is ever trained.
//
// Reference: Rafailov et al. (2023), Azar et al. (2023) for IPO

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ml::error::{DpoError, DpoResult};

/// Loss variants over the preference logit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DpoLossType {
    /// `-log sigmoid(u)`, the DPO objective.
    #[default]
    Sigmoid,
    /// Identity preference optimisation: `(diff - 1/(2 beta))^2` on the
    /// unscaled log-ratio difference.
    Ipo,
    /// `max(0, 1 - u)`.
    Hinge,
}

impl fmt::Display for DpoLossType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DpoLossType::Sigmoid => "sigmoid",
            DpoLossType::Ipo     => "ipo",
            DpoLossType::Hinge   => "hinge",
        };
        f.write_str(name)
    }
}

impl FromStr for DpoLossType {
    type Err = DpoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sigmoid" => Ok(DpoLossType::Sigmoid),
            "ipo"     => Ok(DpoLossType::Ipo),
            "hinge"   => Ok(DpoLossType::Hinge),
            other     => Err(DpoError::Config(format!(
                "unknown loss type '{other}' (expected sigmoid, ipo or hinge)"
            ))),
        }
    }
}

/// DPO loss configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DpoLossConfig {
    /// Strength of the implicit KL penalty towards the reference.
    /// Typical range: 0.1 to 0.5. Default: 0.1
    pub beta: f64,

    /// Loss function type.
    pub loss_type: DpoLossType,

    /// Probability that a preference label is flipped, in `[0, 0.5)`.
    /// Sigmoid loss only.
    pub label_smoothing: f64,

    /// Drop the reference model: log-ratios become plain policy log-probs.
    pub reference_free: bool,
}

impl Default for DpoLossConfig {
    fn default() -> Self {
        Self {
            beta:            0.1,
            loss_type:       DpoLossType::Sigmoid,
            label_smoothing: 0.0,
            reference_free:  false,
        }
    }
}

impl DpoLossConfig {
    pub fn new(beta: f64) -> Self {
        Self { beta, ..Default::default() }
    }

    pub fn with_loss_type(mut self, loss_type: DpoLossType) -> Self {
        self.loss_type = loss_type;
        self
    }

    pub fn with_label_smoothing(mut self, smoothing: f64) -> Self {
        self.label_smoothing = smoothing;
        self
    }

    pub fn with_reference_free(mut self, reference_free: bool) -> Self {
        self.reference_free = reference_free;
        self
    }

    pub fn validate(&self) -> DpoResult<()> {
        if !(self.beta.is_finite() && self.beta > 0.0) {
            return Err(DpoError::Config(format!("beta must be positive, got {}", self.beta)));
        }
        if !(0.0..0.5).contains(&self.label_smoothing) {
            return Err(DpoError::Config(format!(
                "label_smoothing must be in [0, 0.5), got {}",
                self.label_smoothing
            )));
        }
        if self.label_smoothing > 0.0 && self.loss_type != DpoLossType::Sigmoid {
            return Err(DpoError::Config(format!(
                "label smoothing is only supported by the sigmoid loss, not {}",
                self.loss_type
            )));
        }
        Ok(())
    }
}

/// Loss plus the implicit rewards that produced it.
#[derive(Debug, Clone)]
pub struct DpoLossOutput<B: Backend> {
    /// Batch mean, shape [1].
    pub loss: Tensor<B, 1>,
    /// `beta * (log pi(y_w|x) - log pi_ref(y_w|x))`, detached, shape [batch].
    pub chosen_rewards: Tensor<B, 1>,
    /// `beta * (log pi(y_l|x) - log pi_ref(y_l|x))`, detached, shape [batch].
    pub rejected_rewards: Tensor<B, 1>,
}

/// `log(sigmoid(x))` without overflow: `min(x, 0) - log1p(exp(-|x|))`.
pub fn log_sigmoid<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clone().clamp_max(0.0) - x.abs().neg().exp().log1p()
}

/// Compute the DPO loss for a batch of sequence log-probabilities.
///
/// All inputs have shape [batch]. The reference inputs are ignored when
/// `cfg.reference_free` is set.
pub fn dpo_loss<B: Backend>(
    cfg:             &DpoLossConfig,
    policy_chosen:   Tensor<B, 1>,
    policy_rejected: Tensor<B, 1>,
    ref_chosen:      Tensor<B, 1>,
    ref_rejected:    Tensor<B, 1>,
) -> DpoLossOutput<B> {
    // log(a/b) = log a - log b, so the ratios are plain differences.
    let (chosen_logratios, rejected_logratios) = if cfg.reference_free {
        (policy_chosen, policy_rejected)
    } else {
        (policy_chosen - ref_chosen, policy_rejected - ref_rejected)
    };

    let diff   = chosen_logratios.clone() - rejected_logratios.clone();
    let logits = diff.clone().mul_scalar(cfg.beta);

    let losses = match cfg.loss_type {
        DpoLossType::Sigmoid => {
            let s       = cfg.label_smoothing;
            let primary = log_sigmoid(logits.clone()).mul_scalar(-(1.0 - s));
            if s > 0.0 {
                primary - log_sigmoid(logits.neg()).mul_scalar(s)
            } else {
                primary
            }
        }
        DpoLossType::Ipo => {
            let gap = diff.sub_scalar(1.0 / (2.0 * cfg.beta));
            gap.clone() * gap
        }
        DpoLossType::Hinge => logits.neg().add_scalar(1.0).clamp_min(0.0),
    };

    DpoLossOutput {
        loss:             losses.mean(),
        chosen_rewards:   chosen_logratios.mul_scalar(cfg.beta).detach(),
        rejected_rewards: rejected_logratios.mul_scalar(cfg.beta).detach(),
    }
}
