use anyhow::{bail, Result};
use candle_core::{DType, Tensor};

/// Mean of the unmasked token states, L2-normalised per row.
///
/// `hidden` is `[B, T, H]`, `attention_mask` is `[B, T]` (any numeric dtype);
/// the result is `[B, H]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, _seq, hidden_dim) = match hidden.dims() {
        &[b, t, h] => (b, t, h),
        dims => bail!("hidden states must be [B,T,H], got {:?}", dims),
    };

    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let mask_3d = mask.unsqueeze(2)?.broadcast_as(hidden.shape())?;
    let summed = (hidden * &mask_3d)?.sum(1)?;
    // all-padding rows would divide by zero
    let lengths = mask.sum(1)?.unsqueeze(1)?.maximum(1f64)?;
    let mean = summed.broadcast_div(&lengths)?;

    let eps = match hidden.dtype() { DType::F16 | DType::BF16 => 1e-6, _ => 1e-12 };
    let norm = (mean.sqr()?.sum_keepdim(1)?.sqrt()? + eps)?;
    let normalized = mean.broadcast_div(&norm)?;
    if normalized.dims() != [batch, hidden_dim].as_slice() {
        bail!("pooled shape {:?} != [{batch}, {hidden_dim}]", normalized.dims());
    }
    Ok(normalized)
}
