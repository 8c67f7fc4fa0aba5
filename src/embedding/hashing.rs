//! Feature-hashing embedder
//!
//! Maps each lowercased token to a fixed bucket and counts occurrences. No
//! model, no vocabulary, no network: the same text always gives the same
//! vector, across processes and toolchain versions (FNV-1a, not the std
//! hasher, whose output is not stable between releases). Used for offline
//! runs and tests; retrieval quality is lexical only.

use async_trait::async_trait;

use super::Embedder;
use crate::errors::{Result, RetrievalError};

/// Default number of hash buckets
pub const DEFAULT_DIMENSION: usize = 256;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
    })
}

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RetrievalError::Config(
                "hashing embedder dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Term-frequency vector of one text (not normalized)
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut tf = vec![0.0f32; self.dimension];

        let mut tokens: Vec<String> = text
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        // Punctuation-only text still needs a non-zero vector
        if tokens.is_empty() {
            tokens = text.split_whitespace().map(str::to_string).collect();
        }
        if tokens.is_empty() {
            tf[0] = 1.0;
            return tf;
        }

        for token in &tokens {
            let bucket = (fnv1a(token) % self.dimension as u64) as usize;
            tf[bucket] += 1.0;
        }
        tf
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
        }
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::l2_norm;

    #[test]
    fn test_stable_output() {
        let embedder = HashingEmbedder::default();
        assert_eq!(embedder.embed_one("Piano noise"), embedder.embed_one("piano, NOISE!"));
    }

    #[test]
    fn test_fnv_known_value() {
        // FNV-1a 64 of "a"
        assert_eq!(fnv1a("a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_punctuation_only_is_nonzero() {
        let embedder = HashingEmbedder::new(16).unwrap();
        assert!(l2_norm(&embedder.embed_one("— …")) > 0.0);
        assert!(l2_norm(&embedder.embed_one("")) > 0.0);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(HashingEmbedder::new(0).is_err());
    }

    #[tokio::test]
    async fn test_batch_shape() {
        let embedder = HashingEmbedder::new(32).unwrap();
        let out = embedder
            .embed(&["one".to_string(), "two words".to_string()])
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|v| v.len() == 32));
    }
}
