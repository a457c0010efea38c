// ============================================================
// Layer 4 — Synthetic Preference Source
// ============================================================
// In production the pairs would come from human annotators.
// Here we generate a toy preference task so the full DPO loop
// can run end to end without any tokenizer or dataset files.
//
// The "human" preference is simple and learnable:
//   - prompt:   random content tokens, e.g. [17, 4, 9]
//   - chosen:   counts upward from the last prompt token
//               [10, 11, 12]   (wrapping inside the content range)
//   - rejected: random content tokens
//               [33, 2, 58]
//
// Token id 0 is reserved for padding, so content ids live in
// 1..vocab_size.
//
// Generation is seeded, so the same config always produces
// the same pairs.

use anyhow::{ensure, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::domain::preference::PreferencePair;
use crate::domain::traits::PreferenceSource;

pub struct SyntheticPreferences {
    num_pairs:        usize,
    max_prompt_len:   usize,
    max_response_len: usize,
    vocab_size:       usize,
    seed:             u64,
}

impl SyntheticPreferences {
    pub fn new(
        num_pairs:        usize,
        max_prompt_len:   usize,
        max_response_len: usize,
        vocab_size:       usize,
        seed:             u64,
    ) -> Self {
        Self { num_pairs, max_prompt_len, max_response_len, vocab_size, seed }
    }

    /// Number of usable (non-padding) token ids.
    fn content_ids(&self) -> u32 {
        (self.vocab_size - 1) as u32
    }

    /// The token that follows `prev` in the preferred counting pattern.
    fn successor(&self, prev: u32) -> u32 {
        1 + prev % self.content_ids()
    }

    fn random_tokens(&self, rng: &mut StdRng, len: usize) -> Vec<u32> {
        (0..len).map(|_| rng.gen_range(1..=self.content_ids())).collect()
    }

    fn generate_pair(&self, rng: &mut StdRng) -> PreferencePair {
        let prompt_len   = rng.gen_range(1..=self.max_prompt_len);
        let chosen_len   = rng.gen_range(1..=self.max_response_len);
        let rejected_len = rng.gen_range(1..=self.max_response_len);

        let prompt = self.random_tokens(rng, prompt_len);

        let mut chosen = Vec::with_capacity(chosen_len);
        let mut prev   = *prompt.last().unwrap_or(&1);
        for _ in 0..chosen_len {
            prev = self.successor(prev);
            chosen.push(prev);
        }

        let mut rejected = self.random_tokens(rng, rejected_len);
        if rejected == chosen {
            // Keep the pair informative: the two sides must differ.
            rejected[0] = self.successor(rejected[0]);
        }

        PreferencePair::new(prompt, chosen, rejected)
    }
}

impl PreferenceSource for SyntheticPreferences {
    fn load_pairs(&self) -> Result<Vec<PreferencePair>> {
        ensure!(self.vocab_size >= 3, "vocab_size must be at least 3, got {}", self.vocab_size);
        ensure!(self.max_prompt_len > 0, "max_prompt_len must be positive");
        ensure!(self.max_response_len > 0, "max_response_len must be positive");

        let mut rng   = StdRng::seed_from_u64(self.seed);
        let pairs: Vec<PreferencePair> = (0..self.num_pairs)
            .map(|_| self.generate_pair(&mut rng))
            .collect();

        tracing::debug!(
            "Generated {} synthetic preference pairs (vocab={}, seed={})",
            pairs.len(),
            self.vocab_size,
            self.seed
        );
        Ok(pairs)
    }
}
