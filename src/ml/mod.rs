// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn tensor code lives here.
//
//   model.rs    — Small causal transformer LM used as both
//                 policy and frozen reference
//
//   logprobs.rs — Summed per-sequence log-probabilities of the
//                 response tokens (shifted, masked, gathered)
//
//   loss.rs     — DPO objective and its variants
//                 (sigmoid, IPO, hinge, label smoothing,
//                 reference-free) plus implicit rewards
//
//   trainer.rs  — One DPO optimizer step and the epoch loop
//
//   error.rs    — Typed errors for this layer
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Rafailov et al. (2023) Direct Preference Optimization

pub mod error;

/// Causal transformer language model
pub mod model;

pub mod logprobs;

/// DPO loss variants and implicit rewards
pub mod loss;

/// DPO training step and loop
pub mod trainer;
