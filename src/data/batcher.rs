// ============================================================
// Layer 4 — Preference Batcher
// ============================================================
// Implements Burn's Batcher trait to convert a Vec<PreferencePair>
// into tensors the policy and reference models can consume.
//
// How batching works here:
//   Input:  N preference pairs of varying length
//   Output: PreferenceBatch with two SequenceBatches
//             chosen:   [N, S] ids, mask, labels
//             rejected: [N, S] ids, mask, labels
//
// Both sides are right-padded to ONE common length S (the longest
// prompt+response in the batch). That lets the trainer stack
// chosen and rejected into a single [2N, S] forward pass.
//
// Padding: id PAD_ID, attention 0, label IGNORE_INDEX.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::domain::preference::{PreferencePair, TokenSequence, PAD_ID};

// ─── SequenceBatch ────────────────────────────────────────────────────────────
/// One side (chosen or rejected) of a preference batch.
#[derive(Debug, Clone)]
pub struct SequenceBatch<B: Backend> {
    /// Token ids — shape: [batch_size, seq_len]
    pub input_ids: Tensor<B, 2, Int>,

    /// 1 = real token, 0 = padding — shape: [batch_size, seq_len]
    pub attention_mask: Tensor<B, 2, Int>,

    /// Target ids, IGNORE_INDEX where not scored — shape: [batch_size, seq_len]
    pub labels: Tensor<B, 2, Int>,
}

impl<B: Backend> SequenceBatch<B> {
    /// Stack already-padded sequences of equal length into tensors.
    pub fn from_sequences(sequences: &[TokenSequence], device: &B::Device) -> Self {
        let batch_size = sequences.len();
        let seq_len    = sequences.first().map(|s| s.input_ids.len()).unwrap_or(0);

        let ids_flat: Vec<i32> = sequences
            .iter()
            .flat_map(|s| s.input_ids.iter().map(|&x| x as i32))
            .collect();

        let mask_flat: Vec<i32> = sequences
            .iter()
            .flat_map(|s| s.attention_mask.iter().map(|&x| x as i32))
            .collect();

        let labels_flat: Vec<i64> = sequences
            .iter()
            .flat_map(|s| s.labels.iter().copied())
            .collect();

        let input_ids = Tensor::<B, 1, Int>::from_ints(ids_flat.as_slice(), device)
            .reshape([batch_size, seq_len]);
        let attention_mask = Tensor::<B, 1, Int>::from_ints(mask_flat.as_slice(), device)
            .reshape([batch_size, seq_len]);
        let labels = Tensor::<B, 1, Int>::from_ints(labels_flat.as_slice(), device)
            .reshape([batch_size, seq_len]);

        Self { input_ids, attention_mask, labels }
    }

    /// [batch_size, seq_len]
    pub fn dims(&self) -> [usize; 2] {
        self.input_ids.dims()
    }

    /// Concatenate two batches of equal sequence length along the batch dim.
    pub fn concat(first: Self, second: Self) -> Self {
        Self {
            input_ids:      Tensor::cat(vec![first.input_ids, second.input_ids], 0),
            attention_mask: Tensor::cat(vec![first.attention_mask, second.attention_mask], 0),
            labels:         Tensor::cat(vec![first.labels, second.labels], 0),
        }
    }
}

impl<B: AutodiffBackend> SequenceBatch<B> {
    /// The same batch on the inner (gradient-free) backend.
    pub fn inner(&self) -> SequenceBatch<B::InnerBackend> {
        SequenceBatch {
            input_ids:      self.input_ids.clone().inner(),
            attention_mask: self.attention_mask.clone().inner(),
            labels:         self.labels.clone().inner(),
        }
    }
}

// ─── PreferenceBatch ──────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct PreferenceBatch<B: Backend> {
    pub chosen:   SequenceBatch<B>,
    pub rejected: SequenceBatch<B>,
}

// ─── PreferenceBatcher ────────────────────────────────────────────────────────
/// Holds the target device so tensors are created on the correct GPU/CPU.
#[derive(Clone, Debug)]
pub struct PreferenceBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> PreferenceBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<PreferencePair, PreferenceBatch<B>> for PreferenceBatcher<B> {
    fn batch(&self, items: Vec<PreferencePair>) -> PreferenceBatch<B> {
        let seq_len = items.iter().map(PreferencePair::max_len).max().unwrap_or(0);

        let chosen: Vec<TokenSequence> = items
            .iter()
            .map(|p| p.chosen_sequence().padded(seq_len, PAD_ID))
            .collect();
        let rejected: Vec<TokenSequence> = items
            .iter()
            .map(|p| p.rejected_sequence().padded(seq_len, PAD_ID))
            .collect();

        PreferenceBatch {
            chosen:   SequenceBatch::from_sequences(&chosen, &self.device),
            rejected: SequenceBatch::from_sequences(&rejected, &self.device),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn ints(t: Tensor<TestBackend, 2, Int>) -> Vec<i64> {
        t.into_data().convert::<i64>().to_vec::<i64>().unwrap()
    }

    #[test]
    fn test_both_sides_share_one_padded_length() {
        let batcher = PreferenceBatcher::<TestBackend>::new(Default::default());
        let batch   = batcher.batch(vec![
            PreferencePair::new(vec![1, 2], vec![3], vec![4, 5, 6]),
            PreferencePair::new(vec![7], vec![8, 9], vec![10]),
        ]);

        assert_eq!(batch.chosen.dims(),   [2, 5]);
        assert_eq!(batch.rejected.dims(), [2, 5]);

        assert_eq!(
            ints(batch.chosen.input_ids),
            vec![1, 2, 3, 0, 0,
                 7, 8, 9, 0, 0]
        );
        assert_eq!(
            ints(batch.chosen.attention_mask),
            vec![1, 1, 1, 0, 0,
                 1, 1, 1, 0, 0]
        );
        assert_eq!(
            ints(batch.rejected.labels),
            vec![-100, -100, 4, 5, 6,
                 -100, 10, -100, -100, -100]
        );
    }

    #[test]
    fn test_concat_stacks_along_batch() {
        let batcher = PreferenceBatcher::<TestBackend>::new(Default::default());
        let batch   = batcher.batch(vec![PreferencePair::new(vec![1], vec![2], vec![3])]);

        let both = SequenceBatch::concat(batch.chosen, batch.rejected);
        assert_eq!(both.dims(), [2, 2]);
        assert_eq!(ints(both.input_ids), vec![1, 2, 1, 3]);
    }
}
