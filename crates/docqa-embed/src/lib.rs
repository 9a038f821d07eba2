//! docqa-embed
//!
//! Sentence embeddings for ingestion and retrieval. `SentenceEmbedder` runs a
//! BERT or XLM-RoBERTa checkpoint through candle with masked mean pooling;
//! `HashEmbedder` is a deterministic stand-in for tests and offline runs.
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;

use docqa_core::config::{EmbeddingBackend, EmbeddingSettings};
use docqa_core::Embedder;

mod device;
mod pool;
mod tokenize;

pub use device::select_device;
pub use pool::masked_mean_l2;
pub use tokenize::{tokenize_batch, TokenBatch};

enum Backbone {
    Bert(BertModel),
    XlmRoberta(XLMRobertaModel),
}

impl Backbone {
    fn forward(&self, batch: &TokenBatch) -> Result<Tensor> {
        let hidden = match self {
            Self::Bert(m) => m.forward(&batch.input_ids, &batch.token_type_ids, Some(&batch.attention_mask))?,
            Self::XlmRoberta(m) => m.forward(
                &batch.input_ids,
                &batch.attention_mask,
                &batch.token_type_ids,
                None,
                None,
                None,
            )?,
        };
        Ok(hidden)
    }
}

/// Pretrained sentence-embedding model loaded from a local directory holding
/// `config.json`, `tokenizer.json` and `model.safetensors` (or
/// `pytorch_model.bin`).
pub struct SentenceEmbedder {
    backbone: Backbone,
    tokenizer: Tokenizer,
    device: Device,
    id: String,
    dim: usize,
    max_len: usize,
    batch_size: usize,
    pad_id: u32,
}

impl SentenceEmbedder {
    pub fn load(settings: &EmbeddingSettings) -> Result<Self> {
        let model_dir = settings.model_dir.as_path();
        if !model_dir.is_dir() {
            return Err(anyhow!("Embedding model directory not found: {}", model_dir.display()));
        }
        let device = select_device();
        let started = Instant::now();

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let raw: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?,
        )?;
        let model_type = raw.get("model_type").and_then(|v| v.as_str()).unwrap_or("bert").to_string();
        let dim = raw
            .get("hidden_size")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))? as usize;

        let vb = load_weights(model_dir, &device)?;
        let (backbone, default_pad, position_offset) = match model_type.as_str() {
            "bert" => {
                let config: BertConfig = serde_json::from_value(raw.clone())?;
                (Backbone::Bert(BertModel::load(vb, &config)?), 0u32, 0usize)
            }
            "xlm-roberta" | "roberta" => {
                let config: XLMRobertaConfig = serde_json::from_value(raw.clone())?;
                // positions start after the padding index
                (Backbone::XlmRoberta(XLMRobertaModel::new(&config, vb)?), 1u32, 2usize)
            }
            other => return Err(anyhow!("Unsupported model_type '{}' in {}", other, config_path.display())),
        };
        let pad_id = raw.get("pad_token_id").and_then(|v| v.as_u64()).map(|v| v as u32).unwrap_or(default_pad);
        let model_max = raw
            .get("max_position_embeddings")
            .and_then(|v| v.as_u64())
            .map(|v| (v as usize).saturating_sub(position_offset))
            .unwrap_or(settings.max_len);
        let max_len = settings.max_len.min(model_max).max(1);

        let name = model_dir.file_name().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        let id = format!("{model_type}:{name}:d{dim}");
        tracing::info!(%id, max_len, elapsed_ms = started.elapsed().as_millis() as u64, "embedding model loaded");

        Ok(Self { backbone, tokenizer, device, id, dim, max_len, batch_size: settings.batch_size.max(1), pad_id })
    }

    fn embed_group(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let batch = tokenize_batch(&self.tokenizer, texts, self.max_len, self.pad_id, &self.device)?;
        let hidden = self.backbone.forward(&batch)?;
        let pooled = masked_mean_l2(&hidden, &batch.attention_mask)?;
        Ok(pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2::<f32>()?)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        // SAFETY: the weights file is treated as read-only for the model's lifetime.
        return Ok(unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, device)? });
    }
    let weights_path = model_dir.join("pytorch_model.bin");
    let weights = candle_core::pickle::read_all(&weights_path)
        .with_context(|| format!("reading weights from {}", weights_path.display()))?;
    let weights_map: HashMap<String, Tensor> = weights.into_iter().collect();
    Ok(VarBuilder::from_tensors(weights_map, DType::F32, device))
}

impl Embedder for SentenceEmbedder {
    fn id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let started = Instant::now();
        let mut out = Vec::with_capacity(texts.len());
        for group in texts.chunks(self.batch_size) {
            out.extend(self.embed_group(group)?);
        }
        tracing::debug!(texts = texts.len(), elapsed_ms = started.elapsed().as_millis() as u64, "embedded batch");
        Ok(out)
    }
}

/// Deterministic bag-of-tokens embedder: each lowercase whitespace token is
/// hashed into one of `dim` buckets, then the vector is L2-normalised.
///
/// Texts sharing tokens score higher than texts that don't, which is enough
/// to exercise retrieval without model weights.
pub struct HashEmbedder {
    dim: usize,
    id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1), id: format!("hash:xxh64:d{}", dim.max(1)) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;

        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for HashEmbedder {
    fn id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Build the embedder selected by `embedding.backend`.
pub fn default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    match settings.backend {
        EmbeddingBackend::Hash => {
            tracing::info!(dim = settings.hash_dim, "using HashEmbedder");
            Ok(Arc::new(HashEmbedder::new(settings.hash_dim)))
        }
        EmbeddingBackend::Model => Ok(Arc::new(SentenceEmbedder::load(settings)?)),
    }
}
