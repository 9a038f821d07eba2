use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// Model inputs for one batch, all shaped `[B, T]`.
pub struct TokenBatch {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub token_type_ids: Tensor,
}

/// Tokenize `texts`, truncating to `max_len` and right-padding with `pad_id`
/// to the longest sequence in the batch.
pub fn tokenize_batch(
    tokenizer: &Tokenizer,
    texts: &[String],
    max_len: usize,
    pad_id: u32,
    device: &Device,
) -> Result<TokenBatch> {
    let encodings = tokenizer
        .encode_batch(texts.to_vec(), true)
        .map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let seq_len = encodings
        .iter()
        .map(|e| e.get_ids().len().min(max_len))
        .max()
        .unwrap_or(0)
        .max(1);

    let mut ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut mask = Vec::with_capacity(encodings.len() * seq_len);
    for enc in &encodings {
        let n = enc.get_ids().len().min(max_len);
        ids.extend_from_slice(&enc.get_ids()[..n]);
        mask.extend_from_slice(&enc.get_attention_mask()[..n]);
        ids.extend(std::iter::repeat(pad_id).take(seq_len - n));
        mask.extend(std::iter::repeat(0u32).take(seq_len - n));
    }

    let shape = (encodings.len(), seq_len);
    let input_ids = Tensor::from_vec(ids, shape, device)?;
    let attention_mask = Tensor::from_vec(mask, shape, device)?;
    let token_type_ids = input_ids.zeros_like()?;
    Ok(TokenBatch { input_ids, attention_mask, token_type_ids })
}
