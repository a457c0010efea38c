// ============================================================
// Layer 5 — Sequence Log-Probabilities
// ============================================================
// log π(y|x) for an autoregressive model is the sum of the
// per-token log-probabilities of the response given its history:
//
//   log π(y|x) = Σ_t log softmax(logits[t])[labels[t+1]]
//
// Alignment: the model predicts the NEXT token, so logits[t]
// scores labels[t+1]. The last logit has no target and the first
// label has no prediction; both are dropped.
//
// Masking: labels equal to IGNORE_INDEX (prompt and padding) are
// excluded. The mask is built BEFORE gathering because -100 is
// not a valid vocabulary index; ignored targets are replaced by 0
// for the gather and then zeroed out by the mask.

use burn::{prelude::*, tensor::activation::log_softmax};

use crate::data::batcher::SequenceBatch;
use crate::domain::preference::IGNORE_INDEX;
use crate::ml::model::CausalLm;

/// Sum of next-token log-probabilities over the non-ignored labels.
///
/// * `logits` - [batch, seq_len, vocab]
/// * `labels` - [batch, seq_len], IGNORE_INDEX where not scored
///
/// Returns one value per sequence, shape [batch]. Rows with fewer than
/// two positions or with every label ignored score 0.
///
/// Labels other than IGNORE_INDEX must be valid vocabulary indices.
pub fn sequence_log_probs<B: Backend>(logits: Tensor<B, 3>, labels: Tensor<B, 2, Int>) -> Tensor<B, 1> {
    let [batch_size, seq_len, vocab_size] = logits.dims();
    if seq_len < 2 {
        return Tensor::zeros([batch_size], &logits.device());
    }
    let steps = seq_len - 1;

    let logits  = logits.slice([0..batch_size, 0..steps, 0..vocab_size]);
    let targets = labels.slice([0..batch_size, 1..seq_len]);

    let ignored      = targets.clone().equal_elem(IGNORE_INDEX);
    let mask         = ignored.clone().bool_not().float();
    let safe_targets = targets.mask_fill(ignored, 0);

    let log_probs = log_softmax(logits, 2);
    let per_token = log_probs
        .gather(2, safe_targets.reshape([batch_size, steps, 1]))
        .reshape([batch_size, steps]);

    (per_token * mask).sum_dim(1).reshape([batch_size])
}

/// Forward pass followed by [`sequence_log_probs`].
pub fn model_log_probs<B: Backend, M: CausalLm<B>>(model: &M, batch: &SequenceBatch<B>) -> Tensor<B, 1> {
    let logits = model.logits(batch.input_ids.clone(), batch.attention_mask.clone());
    sequence_log_probs(logits, batch.labels.clone())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn log_softmax_2(a: f64, b: f64) -> [f64; 2] {
        let norm = (a.exp() + b.exp()).ln();
        [a - norm, b - norm]
    }

    fn logits_3d(values: &[f32], dims: [usize; 3]) -> Tensor<TestBackend, 3> {
        Tensor::<TestBackend, 1>::from_floats(values, &Default::default()).reshape(dims)
    }

    fn labels_2d(values: &[i64], dims: [usize; 2]) -> Tensor<TestBackend, 2, Int> {
        Tensor::<TestBackend, 1, Int>::from_ints(values, &Default::default()).reshape(dims)
    }

    fn values(t: Tensor<TestBackend, 1>) -> Vec<f64> {
        t.into_data().convert::<f64>().to_vec::<f64>().unwrap()
    }

    #[test]
    fn test_matches_brute_force_on_two_token_vocab() {
        // positions:   0          1          2
        // logits:   [0.0, 1.0] [2.0, 0.5] [0.3, 0.3]
        // labels:     -100        1          0
        // logit 0 scores label 1 (=1), logit 1 scores label 2 (=0)
        let logits = logits_3d(&[0.0, 1.0, 2.0, 0.5, 0.3, 0.3], [1, 3, 2]);
        let labels = labels_2d(&[-100, 1, 0], [1, 3]);

        let expected = log_softmax_2(0.0, 1.0)[1] + log_softmax_2(2.0, 0.5)[0];
        let got      = values(sequence_log_probs(logits, labels));

        assert_eq!(got.len(), 1);
        assert!((got[0] - expected).abs() < 1e-5, "got {}, expected {}", got[0], expected);
    }

    #[test]
    fn test_ignored_targets_do_not_depend_on_logits() {
        let labels = labels_2d(&[-100, 1, -100], [1, 3]);
        let a = logits_3d(&[0.0, 1.0, 5.0, -5.0, 0.0, 0.0], [1, 3, 2]);
        let b = logits_3d(&[0.0, 1.0, -7.0, 9.0, 0.0, 0.0], [1, 3, 2]);

        let la = values(sequence_log_probs(a, labels.clone()));
        let lb = values(sequence_log_probs(b, labels));

        // Only logit 0 → label 1 is scored
        assert!((la[0] - lb[0]).abs() < 1e-6);
        assert!((la[0] - log_softmax_2(0.0, 1.0)[1]).abs() < 1e-5);
    }

    #[test]
    fn test_rows_are_independent() {
        let logits = logits_3d(
            &[0.0, 1.0, 2.0, 0.5,
              0.0, 1.0, 2.0, 0.5],
            [2, 2, 2],
        );
        let labels = labels_2d(&[0, 1, 0, 0], [2, 2]);

        let got = values(sequence_log_probs(logits, labels));
        assert!((got[0] - log_softmax_2(0.0, 1.0)[1]).abs() < 1e-5);
        assert!((got[1] - log_softmax_2(0.0, 1.0)[0]).abs() < 1e-5);
    }

    #[test]
    fn test_fully_ignored_sequence_scores_zero() {
        let logits = logits_3d(&[0.0, 1.0, 2.0, 0.5], [1, 2, 2]);
        let labels = labels_2d(&[-100, -100], [1, 2]);
        assert_eq!(values(sequence_log_probs(logits, labels)), vec![0.0]);
    }

    #[test]
    fn test_single_position_scores_zero() {
        let logits = logits_3d(&[0.0, 1.0, 3.0, 4.0], [2, 1, 2]);
        let labels = labels_2d(&[1, 0], [2, 1]);
        assert_eq!(values(sequence_log_probs(logits, labels)), vec![0.0, 0.0]);
    }

    #[test]
    fn test_log_probs_are_never_positive() {
        let logits = logits_3d(&[3.0, -1.0, 0.5, 0.5, 9.0, 0.0], [1, 3, 2]);
        let labels = labels_2d(&[0, 0, 1], [1, 3]);
        assert!(values(sequence_log_probs(logits, labels))[0] <= 0.0);
    }

    struct FixedLogits {
        logits: Tensor<TestBackend, 3>,
    }

    impl CausalLm<TestBackend> for FixedLogits {
        fn logits(&self, _: Tensor<TestBackend, 2, Int>, _: Tensor<TestBackend, 2, Int>) -> Tensor<TestBackend, 3> {
            self.logits.clone()
        }
    }

    #[test]
    fn test_model_log_probs_uses_batch_labels() {
        let device = Default::default();
        let model  = FixedLogits { logits: logits_3d(&[0.0, 1.0, 2.0, 0.5], [1, 2, 2]) };
        let batch  = SequenceBatch::<TestBackend> {
            input_ids:      labels_2d(&[1, 1], [1, 2]),
            attention_mask: Tensor::<TestBackend, 2, Int>::ones([1, 2], &device),
            labels:         labels_2d(&[-100, 1], [1, 2]),
        };

        let got = values(model_log_probs(&model, &batch));
        assert!((got[0] - log_softmax_2(0.0, 1.0)[1]).abs() < 1e-5);
    }
}
