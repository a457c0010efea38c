// ============================================================
// Layer 5 — Causal Transformer Language Model
// ============================================================
// Decoder-only transformer used as both the DPO policy and the
// frozen reference:
//
//   token ids ─► token emb + position emb ─► N × DecoderBlock
//             ─► final LayerNorm ─► LM head ─► logits [B, S, V]
//
// Each block sees two masks:
//   - causal: position t attends only to positions ≤ t
//   - padding: right-padded positions are never attended to
//
// Reference: Burn Book §3, Vaswani et al. (2017), Radford et al. (2019)

use burn::{
    nn::{
        attention::{generate_autoregressive_mask, MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};

// ─── CausalLm ─────────────────────────────────────────────────────────────────
/// An autoregressive language model: the logit at position `t` scores the
/// token at position `t + 1`.
///
/// Both the policy and the frozen reference are used only through this
/// trait, so any Burn module with a next-token head can be trained with DPO.
pub trait CausalLm<B: Backend> {
    /// input_ids, attention_mask: [batch, seq_len] → logits: [batch, seq_len, vocab]
    fn logits(&self, input_ids: Tensor<B, 2, Int>, attention_mask: Tensor<B, 2, Int>) -> Tensor<B, 3>;
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct TransformerLmConfig {
    pub vocab_size:  usize,
    pub max_seq_len: usize,
    pub d_model:     usize,
    pub num_heads:   usize,
    pub num_layers:  usize,
    pub d_ff:        usize,
    pub dropout:     f64,
}

impl TransformerLmConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TransformerLm<B> {
        TransformerLm {
            token_embedding:    EmbeddingConfig::new(self.vocab_size, self.d_model).init(device),
            position_embedding: EmbeddingConfig::new(self.max_seq_len, self.d_model).init(device),
            layers:             (0..self.num_layers).map(|_| self.decoder_block(device)).collect(),
            final_norm:         LayerNormConfig::new(self.d_model).init(device),
            lm_head:            LinearConfig::new(self.d_model, self.vocab_size).init(device),
            dropout:            DropoutConfig::new(self.dropout).init(),
            max_seq_len:        self.max_seq_len,
        }
    }

    // Post-norm block (LayerNorm after each residual add, as in Vaswani
    // et al.). Shallow stacks train fine this way; final_norm still
    // normalises what the LM head sees.
    fn decoder_block<B: Backend>(&self, device: &B::Device) -> DecoderBlock<B> {
        DecoderBlock {
            self_attn: MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
                .with_dropout(self.dropout)
                .init(device),
            ffn_in:    LinearConfig::new(self.d_model, self.d_ff).init(device),
            ffn_out:   LinearConfig::new(self.d_ff, self.d_model).init(device),
            attn_norm: LayerNormConfig::new(self.d_model).init(device),
            ffn_norm:  LayerNormConfig::new(self.d_model).init(device),
            dropout:   DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct DecoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_in:      Linear<B>,
    pub ffn_out:     Linear<B>,
    pub attn_norm:   LayerNorm<B>,
    pub ffn_norm:    LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> DecoderBlock<B> {
    /// mask_pad: [batch, seq_len], true = padding key.
    /// mask_attn: [batch, seq_len, seq_len], true = future position.
    pub fn forward(
        &self,
        x:         Tensor<B, 3>,
        mask_pad:  Tensor<B, 2, Bool>,
        mask_attn: Tensor<B, 3, Bool>,
    ) -> Tensor<B, 3> {
        let input = MhaInput::self_attn(x.clone())
            .mask_pad(mask_pad)
            .mask_attn(mask_attn);
        let attn_output = self.self_attn.forward(input).context;
        let x = self.attn_norm.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_out.forward(
            burn::tensor::activation::gelu(self.ffn_in.forward(x.clone()))
        );
        self.ffn_norm.forward(x + self.dropout.forward(ffn_out))
    }
}

#[derive(Module, Debug)]
pub struct TransformerLm<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub layers:             Vec<DecoderBlock<B>>,
    pub final_norm:         LayerNorm<B>,
    pub lm_head:            Linear<B>,
    pub dropout:            Dropout,
    pub max_seq_len:        usize,
}

impl<B: Backend> TransformerLm<B> {
    /// input_ids, attention_mask: [batch, seq_len] → logits: [batch, seq_len, vocab]
    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> Tensor<B, 3> {
        let [batch_size, seq_len] = input_ids.dims();
        let device = input_ids.device();

        let tok_emb = self.token_embedding.forward(input_ids);

        // Self-attention is permutation-invariant, so position must be injected explicitly.
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &device)
            .unsqueeze::<2>()
            .expand(Shape::new([batch_size, seq_len]));
        let pos_emb = self.position_embedding.forward(positions);

        let mask_pad  = attention_mask.equal_elem(0);
        let mask_attn = generate_autoregressive_mask::<B>(batch_size, seq_len, &device);

        let mut x = self.dropout.forward(tok_emb + pos_emb);
        for layer in &self.layers {
            x = layer.forward(x, mask_pad.clone(), mask_attn.clone());
        }
        let x = self.final_norm.forward(x); // [batch, seq_len, d_model]

        self.lm_head.forward(x) // [batch, seq_len, vocab]
    }
}

impl<B: Backend> CausalLm<B> for TransformerLm<B> {
    fn logits(&self, input_ids: Tensor<B, 2, Int>, attention_mask: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        self.forward(input_ids, attention_mask)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn tiny_model(device: &<TestBackend as Backend>::Device) -> TransformerLm<TestBackend> {
        TransformerLmConfig::new(11, 8, 16, 2, 1, 32, 0.0).init(device)
    }

    fn ids(values: [i32; 4]) -> Tensor<TestBackend, 2, Int> {
        Tensor::<TestBackend, 1, Int>::from_ints(values, &Default::default()).reshape([1, 4])
    }

    #[test]
    fn test_logits_shape() {
        let device = Default::default();
        let model  = tiny_model(&device);
        let input  = Tensor::<TestBackend, 1, Int>::from_ints([1, 2, 3, 4, 5, 6], &device)
            .reshape([2, 3]);
        let mask   = input.ones_like();

        assert_eq!(model.logits(input, mask).dims(), [2, 3, 11]);
    }

    #[test]
    fn test_future_tokens_do_not_change_past_logits() {
        let device = Default::default();
        let model  = tiny_model(&device);
        let mask   = ids([1, 1, 1, 1]);

        let a = model.forward(ids([1, 2, 3, 4]), mask.clone());
        let b = model.forward(ids([1, 2, 9, 10]), mask);

        // Positions 0 and 1 only see tokens 1, 2 in both inputs
        let prefix_a = a.slice([0..1, 0..2, 0..11]);
        let prefix_b = b.slice([0..1, 0..2, 0..11]);
        prefix_a.into_data().assert_approx_eq(&prefix_b.into_data(), 4);
    }
}
