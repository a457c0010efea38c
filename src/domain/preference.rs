// ============================================================
// Layer 3 — Preference Domain Types
// ============================================================
// A preference pair is the unit of DPO training data:
//   - a prompt x
//   - a response y_w that a human preferred ("chosen")
//   - a response y_l that a human rejected
//
// The model never sees the pair directly. Each side becomes one
// autoregressive sequence `prompt ++ response`, and only the
// response tokens are scored. Prompt positions get the label
// IGNORE_INDEX so they drop out of log π(y|x).
//
// Example:
//   prompt   = [1, 2, 3]
//   chosen   = [4, 5]
//   input    = [1, 2, 3, 4, 5]
//   labels   = [-100, -100, -100, 4, 5]
//
// Reference: Rafailov et al. (2023) Direct Preference Optimization

/// Label sentinel for positions excluded from the log-likelihood.
pub const IGNORE_INDEX: i64 = -100;

/// Token id used to right-pad sequences inside a batch.
pub const PAD_ID: u32 = 0;

/// One prompt with a preferred and a dispreferred completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferencePair {
    pub prompt_ids:   Vec<u32>,
    pub chosen_ids:   Vec<u32>,
    pub rejected_ids: Vec<u32>,
}

impl PreferencePair {
    pub fn new(prompt_ids: Vec<u32>, chosen_ids: Vec<u32>, rejected_ids: Vec<u32>) -> Self {
        Self { prompt_ids, chosen_ids, rejected_ids }
    }

    /// `prompt ++ chosen` with the prompt masked out of the labels.
    pub fn chosen_sequence(&self) -> TokenSequence {
        TokenSequence::from_prompt_and_response(&self.prompt_ids, &self.chosen_ids)
    }

    /// `prompt ++ rejected` with the prompt masked out of the labels.
    pub fn rejected_sequence(&self) -> TokenSequence {
        TokenSequence::from_prompt_and_response(&self.prompt_ids, &self.rejected_ids)
    }

    /// Each side must score at least one response token. That rules out
    /// empty responses and single-token sequences with nothing to predict.
    pub fn is_valid(&self) -> bool {
        self.chosen_sequence().target_count() > 0 && self.rejected_sequence().target_count() > 0
    }

    /// Length of the longer of the two full sequences.
    pub fn max_len(&self) -> usize {
        self.prompt_ids.len() + self.chosen_ids.len().max(self.rejected_ids.len())
    }
}

/// A single model input: token ids, attention mask and shifted-later labels.
///
/// `labels[t]` is the token the model should produce at position `t`.
/// The log-probability routine does the one-step shift itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSequence {
    pub input_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub labels:         Vec<i64>,
}

impl TokenSequence {
    pub fn from_prompt_and_response(prompt: &[u32], response: &[u32]) -> Self {
        let mut input_ids = Vec::with_capacity(prompt.len() + response.len());
        input_ids.extend_from_slice(prompt);
        input_ids.extend_from_slice(response);

        let mut labels = vec![IGNORE_INDEX; prompt.len()];
        labels.extend(response.iter().map(|&id| id as i64));

        let attention_mask = vec![1u32; input_ids.len()];

        Self { input_ids, attention_mask, labels }
    }

    /// Number of positions that contribute to the log-likelihood.
    pub fn target_count(&self) -> usize {
        // The first label is never predicted (no preceding logit).
        self.labels.iter().skip(1).filter(|&&l| l != IGNORE_INDEX).count()
    }

    /// Right-pad to `len` tokens. Padding gets mask 0 and IGNORE_INDEX labels.
    /// Sequences already at or beyond `len` are returned unchanged.
    pub fn padded(&self, len: usize, pad_id: u32) -> Self {
        let mut out = self.clone();
        while out.input_ids.len() < len {
            out.input_ids.push(pad_id);
            out.attention_mask.push(0);
            out.labels.push(IGNORE_INDEX);
        }
        out
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_positions_are_ignored() {
        let pair = PreferencePair::new(vec![1, 2, 3], vec![4, 5], vec![6, 7, 8]);

        let chosen = pair.chosen_sequence();
        assert_eq!(chosen.input_ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(chosen.labels,    vec![-100, -100, -100, 4, 5]);
        assert_eq!(chosen.attention_mask, vec![1; 5]);

        let rejected = pair.rejected_sequence();
        assert_eq!(rejected.input_ids, vec![1, 2, 3, 6, 7, 8]);
        assert_eq!(rejected.labels,    vec![-100, -100, -100, 6, 7, 8]);
    }

    #[test]
    fn test_padding_is_masked_and_ignored() {
        let seq    = TokenSequence::from_prompt_and_response(&[9], &[4]);
        let padded = seq.padded(4, PAD_ID);

        assert_eq!(padded.input_ids,      vec![9, 4, 0, 0]);
        assert_eq!(padded.attention_mask, vec![1, 1, 0, 0]);
        assert_eq!(padded.labels,         vec![-100, 4, -100, -100]);
        // Padding never adds scored positions
        assert_eq!(padded.target_count(), seq.target_count());
    }

    #[test]
    fn test_padding_shorter_target_is_noop() {
        let seq = TokenSequence::from_prompt_and_response(&[1, 2], &[3]);
        assert_eq!(seq.padded(2, PAD_ID), seq);
    }

    #[test]
    fn test_target_count_skips_first_position() {
        // With an empty prompt the first response token has no preceding
        // logit, so only the remaining tokens are scored.
        let seq = TokenSequence::from_prompt_and_response(&[], &[5, 6, 7]);
        assert_eq!(seq.target_count(), 2);
    }

    #[test]
    fn test_pair_validity() {
        assert!(PreferencePair::new(vec![1], vec![2], vec![3]).is_valid());
        assert!(!PreferencePair::new(vec![1], vec![], vec![3]).is_valid());
        // Single-token sequences have nothing to predict
        assert!(!PreferencePair::new(vec![], vec![2], vec![3]).is_valid());
        // Without a prompt a two-token response still scores its second token
        assert!(PreferencePair::new(vec![], vec![2, 3], vec![4, 5]).is_valid());
    }

    #[test]
    fn test_max_len_uses_longer_response() {
        let pair = PreferencePair::new(vec![1, 2], vec![3], vec![4, 5, 6]);
        assert_eq!(pair.max_len(), 5);
    }
}
