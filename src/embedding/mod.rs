//! Embedding backends and the vector normalization they all share.
//!
//! The retrieval core treats embedding models as opaque: anything that maps
//! a batch of texts to equally sized vectors can sit behind [`Embedder`].
//! Vectors are L2-normalized by the core, never trusted to arrive unit-length.

pub mod candle;
pub mod hashing;
pub mod ollama;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{EmbedderConfig, EmbedderKind};
use crate::errors::{Result, RetrievalError};

pub use self::candle::CandleEmbedder;
pub use self::hashing::HashingEmbedder;
pub use self::ollama::OllamaEmbedder;

/// Tolerance used when checking that a vector is unit length
pub const UNIT_NORM_TOLERANCE: f32 = 1e-5;

/// Text to vector mapping
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts. Must return exactly one vector per text,
    /// all of the same dimensionality.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Short label for logs and reports
    fn name(&self) -> &str;
}

/// Build the embedder selected in configuration
pub fn from_config(config: &EmbedderConfig) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.kind {
        EmbedderKind::Candle => Arc::new(CandleEmbedder::new(
            config.model.as_deref().unwrap_or(candle::DEFAULT_MODEL_ID),
        )?),
        EmbedderKind::Ollama => Arc::new(OllamaEmbedder::new(
            &config.ollama_url,
            config.model.as_deref().unwrap_or(ollama::DEFAULT_EMBED_MODEL),
            config.timeout_secs,
        )?),
        EmbedderKind::Hashing => Arc::new(HashingEmbedder::new(config.dimension)?),
    };
    Ok(embedder)
}

/// Euclidean norm of a vector
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit length in place.
///
/// `index` only labels the error for a zero (or non-finite) norm.
pub fn normalize_in_place(v: &mut [f32], index: usize) -> Result<()> {
    let norm = l2_norm(v);
    if norm == 0.0 || !norm.is_finite() {
        return Err(RetrievalError::ZeroVector { index });
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    Ok(())
}

/// Normalize every vector of a batch
pub fn normalize_all(vectors: &mut [Vec<f32>]) -> Result<()> {
    for (i, v) in vectors.iter_mut().enumerate() {
        normalize_in_place(v, i)?;
    }
    Ok(())
}

pub fn is_unit(v: &[f32]) -> bool {
    (l2_norm(v) - 1.0).abs() <= UNIT_NORM_TOLERANCE
}

/// Check the shape of an embedder response against its request
pub(crate) fn check_batch(vectors: &[Vec<f32>], expected: usize) -> Result<usize> {
    if vectors.len() != expected {
        return Err(RetrievalError::EmbedderFailed(format!(
            "expected {} vectors, got {}",
            expected,
            vectors.len()
        )));
    }
    let dim = vectors.first().map(|v| v.len()).unwrap_or(0);
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(RetrievalError::DimensionMismatch {
            expected: dim,
            actual: bad.len(),
        });
    }
    Ok(dim)
}
