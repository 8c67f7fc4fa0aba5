//! Ollama embedding client
//!
//! Calls `POST /api/embed` on a local Ollama server with a batch of inputs.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{check_batch, Embedder};
use crate::errors::{Result, RetrievalError};

/// Default embedding model served by Ollama
pub const DEFAULT_EMBED_MODEL: &str = "all-minilm";

/// Embedder backed by an Ollama server
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RetrievalError::EmbedderFailed(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RetrievalError::EmbedderFailed(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let body: EmbedResponse = response.json().await.map_err(|e| {
            RetrievalError::EmbedderFailed(format!("Failed to parse embeddings: {}", e))
        })?;

        check_batch(&body.embeddings, texts.len())?;
        Ok(body.embeddings)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation_trims_slash() {
        let embedder = OllamaEmbedder::new("http://localhost:11434/", "all-minilm", 30).unwrap();
        assert_eq!(embedder.base_url(), "http://localhost:11434");
        assert_eq!(embedder.model(), "all-minilm");
    }

    #[test]
    fn test_request_shape() {
        let input = vec!["a".to_string(), "b".to_string()];
        let request = EmbedRequest {
            model: "all-minilm",
            input: &input,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "all-minilm");
        assert_eq!(json["input"][1], "b");
    }

    #[tokio::test]
    async fn test_empty_batch_skips_network() {
        // Port 9 (discard) is never an Ollama server; an empty batch must not dial it.
        let embedder = OllamaEmbedder::new("http://127.0.0.1:9", "all-minilm", 1).unwrap();
        assert!(embedder.embed(&[]).await.unwrap().is_empty());
    }
}
