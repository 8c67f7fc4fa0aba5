// Local sentence embeddings via a BERT model running on Candle
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::{api::sync::Api, Repo, RepoType};
use serde::Deserialize;
use std::sync::Arc;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

use super::{check_batch, Embedder};
use crate::errors::{Result, RetrievalError};

/// Default sentence-transformers model (384-d)
pub const DEFAULT_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// BERT position embedding limit
const MAX_POSITION_TOKENS: usize = 512;

/// Truncation used when the repo ships no `sentence_bert_config.json`
pub const DEFAULT_MAX_SEQ_LENGTH: usize = 256;

#[derive(Debug, Deserialize)]
struct SentenceBertConfig {
    max_seq_length: Option<usize>,
}

/// Token limit from a `sentence_bert_config.json` body, capped at the
/// position embedding size
fn max_seq_length(sentence_config: Option<&str>) -> usize {
    sentence_config
        .and_then(|raw| serde_json::from_str::<SentenceBertConfig>(raw).ok())
        .and_then(|c| c.max_seq_length)
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_MAX_SEQ_LENGTH)
        .min(MAX_POSITION_TOKENS)
}

fn candle_err(e: impl std::fmt::Display) -> RetrievalError {
    RetrievalError::EmbedderFailed(e.to_string())
}

/// Embedding engine backed by a Hugging Face BERT checkpoint
pub struct CandleEmbedder {
    model: Arc<BertModel>,
    tokenizer: Arc<Tokenizer>,
    device: Device,
    model_id: String,
}

impl CandleEmbedder {
    /// Load (downloading on first use) the model `model_id` from the Hub
    pub fn new(model_id: &str) -> Result<Self> {
        let device = Device::Cpu;

        let api = Api::new().map_err(|e| candle_err(format!("HuggingFace API client: {}", e)))?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .map_err(|e| candle_err(format!("download config: {}", e)))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| candle_err(format!("download tokenizer: {}", e)))?;
        let weights_path = repo
            .get("model.safetensors")
            .map_err(|e| candle_err(format!("download weights: {}", e)))?;

        // Optional; plain BERT repos don't carry it
        let sentence_config = repo
            .get("sentence_bert_config.json")
            .ok()
            .and_then(|path| std::fs::read_to_string(path).ok());
        let max_length = max_seq_length(sentence_config.as_deref());
        debug!(model = model_id, max_length, "sequence truncation");

        let config_contents = std::fs::read_to_string(&config_path)
            .map_err(|e| RetrievalError::io(&config_path, e))?;
        let config: Config = serde_json::from_str(&config_contents)?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| candle_err(format!("load tokenizer: {}", e)))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| candle_err(format!("configure truncation: {}", e)))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                .map_err(|e| candle_err(format!("load weights: {}", e)))?
        };
        let model = BertModel::load(vb, &config).map_err(candle_err)?;

        info!(model = model_id, "loaded candle embedding model");

        Ok(Self {
            model: Arc::new(model),
            tokenizer: Arc::new(tokenizer),
            device,
            model_id: model_id.to_string(),
        })
    }

    /// Run the model on one batch (blocking)
    fn embed_blocking(
        model: &BertModel,
        tokenizer: &Tokenizer,
        device: &Device,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| candle_err(format!("tokenization: {}", e)))?;

        let max_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
        let batch_size = encodings.len();

        let mut flat_ids = vec![0u32; batch_size * max_len];
        let mut flat_mask = vec![0u32; batch_size * max_len];
        for (row, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let offset = row * max_len;
            flat_ids[offset..offset + ids.len()].copy_from_slice(ids);
            flat_mask[offset..offset + mask.len()].copy_from_slice(mask);
        }

        let token_ids =
            Tensor::from_vec(flat_ids, (batch_size, max_len), device).map_err(candle_err)?;
        let attention_mask =
            Tensor::from_vec(flat_mask, (batch_size, max_len), device).map_err(candle_err)?;
        let token_type_ids = token_ids.zeros_like().map_err(candle_err)?;

        let hidden = model
            .forward(&token_ids, &token_type_ids, Some(&attention_mask))
            .map_err(candle_err)?;

        let pooled = Self::mean_pool(&hidden, &attention_mask).map_err(candle_err)?;
        pooled.to_vec2::<f32>().map_err(candle_err)
    }

    /// Mean pooling over the sequence, ignoring padding
    fn mean_pool(hidden: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
        let mask = attention_mask
            .unsqueeze(2)?
            .expand(hidden.shape())?
            .to_dtype(hidden.dtype())?;

        let summed = (hidden * &mask)?.sum(1)?;
        let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
        summed.broadcast_div(&counts)
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[async_trait]
impl Embedder for CandleEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let tokenizer = Arc::clone(&self.tokenizer);
        let device = self.device.clone();
        let batch = texts.to_vec();
        let expected = batch.len();

        let vectors = tokio::task::spawn_blocking(move || {
            Self::embed_blocking(&model, &tokenizer, &device, &batch)
        })
        .await
        .map_err(|e| candle_err(format!("embedding task aborted: {}", e)))??;

        check_batch(&vectors, expected)?;
        Ok(vectors)
    }

    fn name(&self) -> &str {
        &self.model_id
    }
}
