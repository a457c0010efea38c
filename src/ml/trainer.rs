// ============================================================
// Layer 5 — DPO Training Step and Loop
// ============================================================
// One DPO step:
//   1. Policy log-probs for chosen and rejected (with gradients).
//      Both sides are stacked into a single [2N, S] forward pass.
//   2. Reference log-probs on the frozen model. The reference lives
//      on the INNER backend (no autodiff), which is Burn's version of
//      torch.no_grad(): nothing it computes can receive a gradient.
//      The result is lifted back with Tensor::from_inner as a constant.
//   3. DPO loss → backward → GradientsParams → optimizer step.
//      The optimizer is AdamW (decoupled weight decay). Gradients are
//      clipped by L2 norm inside the optimizer, before the update.
//
// Burn builds a fresh gradient store on every backward(), so there
// is no zero_grad() to call between steps.
//
// Key Burn insight:
//   - Training uses TrainBackend (Autodiff<NdArray>) for gradients
//   - policy.valid() returns the same weights on the inner backend;
//     taken once before training it becomes the frozen reference
//
// Reference: Burn Book §5, Rafailov et al. (2023) DPO

use anyhow::{ensure, Result};
use burn::{
    data::dataloader::batcher::Batcher,
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::application::train_use_case::TrainConfig;
use crate::data::batcher::{PreferenceBatch, PreferenceBatcher, SequenceBatch};
use crate::domain::preference::PreferencePair;
use crate::infra::metrics::{MetricsLogger, StepMetrics};
use crate::ml::error::{DpoError, DpoResult};
use crate::ml::logprobs::model_log_probs;
use crate::ml::loss::{dpo_loss, DpoLossConfig};
use crate::ml::model::{CausalLm, TransformerLm};

#[cfg(not(feature = "wgpu"))]
pub type TrainBackend = burn::backend::Autodiff<burn::backend::NdArray>;
#[cfg(feature = "wgpu")]
pub type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Runs DPO optimizer steps and counts them.
pub struct DpoTrainer {
    pub loss: DpoLossConfig,
    pub lr:   f64,
    step:     usize,
}

impl DpoTrainer {
    pub fn new(loss: DpoLossConfig, lr: f64) -> DpoResult<Self> {
        loss.validate()?;
        if !(lr.is_finite() && lr > 0.0) {
            return Err(DpoError::Config(format!("learning rate must be positive, got {lr}")));
        }
        Ok(Self { loss, lr, step: 0 })
    }

    pub fn current_step(&self) -> usize {
        self.step
    }

    /// Policy and reference log-probs for both sides of the batch.
    ///
    /// Returns `(policy_chosen, policy_rejected, ref_chosen, ref_rejected)`,
    /// each of shape [batch]. Reference values carry no gradient.
    pub fn log_probs<B, M>(
        &self,
        policy:    &M,
        reference: &M::InnerModule,
        batch:     PreferenceBatch<B>,
    ) -> DpoResult<[Tensor<B, 1>; 4]>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B> + CausalLm<B>,
        M::InnerModule: CausalLm<B::InnerBackend>,
    {
        let chosen_dims   = batch.chosen.dims();
        let rejected_dims = batch.rejected.dims();
        if chosen_dims != rejected_dims {
            return Err(DpoError::Shape(format!(
                "chosen {chosen_dims:?} and rejected {rejected_dims:?} must share one padded shape"
            )));
        }
        let batch_size = chosen_dims[0];
        if batch_size == 0 {
            return Err(DpoError::Shape("empty preference batch".into()));
        }

        let both = SequenceBatch::concat(batch.chosen, batch.rejected);

        let policy_logps    = model_log_probs(policy, &both);
        let policy_chosen   = policy_logps.clone().slice([0..batch_size]);
        let policy_rejected = policy_logps.slice([batch_size..2 * batch_size]);

        let (ref_chosen, ref_rejected) = if self.loss.reference_free {
            let zeros = Tensor::<B, 1>::zeros([batch_size], &policy_chosen.device());
            (zeros.clone(), zeros)
        } else {
            let ref_logps = Tensor::<B, 1>::from_inner(model_log_probs(reference, &both.inner()));
            (
                ref_logps.clone().slice([0..batch_size]),
                ref_logps.slice([batch_size..2 * batch_size]),
            )
        };

        Ok([policy_chosen, policy_rejected, ref_chosen, ref_rejected])
    }

    /// One optimizer update of `policy` on `batch`.
    ///
    /// Burn modules are moved through the optimizer, so the updated policy
    /// is returned alongside the step's metrics.
    pub fn step<B, M, O>(
        &mut self,
        policy:    M,
        reference: &M::InnerModule,
        batch:     PreferenceBatch<B>,
        optim:     &mut O,
    ) -> DpoResult<(M, StepMetrics)>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B> + CausalLm<B>,
        M::InnerModule: CausalLm<B::InnerBackend>,
        O: Optimizer<M, B>,
    {
        let [policy_chosen, policy_rejected, ref_chosen, ref_rejected] =
            self.log_probs(&policy, reference, batch)?;

        let out = dpo_loss(&self.loss, policy_chosen, policy_rejected, ref_chosen, ref_rejected);

        let loss_value: f64 = out.loss.clone().into_scalar().elem::<f64>();
        let chosen_rewards   = to_host(out.chosen_rewards)?;
        let rejected_rewards = to_host(out.rejected_rewards)?;

        // Backward pass + optimizer update
        let grads  = out.loss.backward();
        let grads  = GradientsParams::from_grads(grads, &policy);
        let policy = optim.step(self.lr, policy, grads);

        self.step += 1;
        let metrics = StepMetrics::compute(
            self.step, loss_value, self.loss.beta, &chosen_rewards, &rejected_rewards,
        );
        Ok((policy, metrics))
    }
}

/// AdamW with betas (0.9, 0.999). Each parameter's gradient is rescaled
/// to at most `max_grad_norm` in L2 norm; `0` turns clipping off.
pub fn adamw_config(weight_decay: f64, max_grad_norm: f64) -> AdamWConfig {
    let clipping = (max_grad_norm > 0.0).then(|| GradientClippingConfig::Norm(max_grad_norm as f32));
    AdamWConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.999)
        .with_epsilon(1e-8)
        .with_weight_decay(weight_decay as f32)
        .with_grad_clipping(clipping)
}

fn to_host<B: Backend>(t: Tensor<B, 1>) -> DpoResult<Vec<f64>> {
    t.into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| DpoError::Data(format!("{e:?}")))
}

/// Outcome of a full training run.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub steps:         usize,
    pub first_loss:    f64,
    pub final_metrics: StepMetrics,
}

pub fn run_training(
    cfg:     &TrainConfig,
    pairs:   Vec<PreferencePair>,
    metrics: Option<&MetricsLogger>,
) -> Result<TrainingSummary> {
    let device = <TrainBackend as Backend>::Device::default();
    tracing::info!("Using device: {:?}", device);
    <TrainBackend as Backend>::seed(cfg.seed);
    train_loop::<TrainBackend>(cfg, pairs, metrics, device)
}

fn train_loop<B: AutodiffBackend>(
    cfg:       &TrainConfig,
    mut pairs: Vec<PreferencePair>,
    metrics:   Option<&MetricsLogger>,
    device:    B::Device,
) -> Result<TrainingSummary> {
    ensure!(!pairs.is_empty(), "no preference pairs to train on");
    if let Some(bad) = pairs.iter().position(|p| !p.is_valid()) {
        anyhow::bail!("preference pair {bad} has an empty response or nothing to predict");
    }
    let longest = pairs.iter().map(PreferencePair::max_len).max().unwrap_or(0);
    ensure!(
        longest <= cfg.max_seq_len,
        "longest pair has {} tokens but max_seq_len is {}",
        longest,
        cfg.max_seq_len
    );

    // ── Build policy and frozen reference ─────────────────────────────────────
    let mut policy: TransformerLm<B> = cfg.model_config().init(&device);
    let reference = policy.valid();
    tracing::info!(
        "Policy ready: {} layers, d_model={}, vocab={}",
        cfg.num_layers, cfg.d_model, cfg.vocab_size
    );

    // ── AdamW optimiser ───────────────────────────────────────────────────────
    let mut optim = adamw_config(cfg.weight_decay, cfg.max_grad_norm).init::<B, TransformerLm<B>>();
    let mut trainer = DpoTrainer::new(cfg.loss_config(), cfg.lr)?;

    let batcher = PreferenceBatcher::<B>::new(device);
    let mut rng = StdRng::seed_from_u64(cfg.seed);

    let mut first_loss = None;
    let mut last       = None;

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {
        pairs.shuffle(&mut rng);

        let mut loss_sum = 0.0f64;
        let mut acc_sum  = 0.0f64;
        let mut batches  = 0usize;

        for chunk in pairs.chunks(cfg.batch_size) {
            let batch = batcher.batch(chunk.to_vec());
            let (next, m) = trainer.step(policy, &reference, batch, &mut optim)?;
            policy = next;

            first_loss.get_or_insert(m.loss);
            loss_sum += m.loss;
            acc_sum  += m.accuracy;
            batches  += 1;

            if m.step % cfg.log_every == 0 || m.step == 1 {
                tracing::info!(
                    "step {:>5} | loss={:.4} | chosen={:+.4} | rejected={:+.4} | margin={:+.4} | acc={:.1}%",
                    m.step, m.loss, m.chosen_reward, m.rejected_reward,
                    m.reward_margin, m.accuracy * 100.0,
                );
                if let Some(logger) = metrics {
                    logger.log(epoch, &m)?;
                }
            }
            last = Some(m);
        }

        println!(
            "Epoch {:>3}/{} | loss={:.4} | reward_acc={:.1}%",
            epoch,
            cfg.epochs,
            loss_sum / batches.max(1) as f64,
            acc_sum / batches.max(1) as f64 * 100.0,
        );
    }

    let final_metrics = last.ok_or_else(|| anyhow::anyhow!("training ran no steps"))?;
    tracing::info!("Training complete after {} steps", trainer.current_step());

    Ok(TrainingSummary {
        steps: trainer.current_step(),
        first_loss: first_loss.unwrap_or(f64::NAN),
        final_metrics,
    })
}
