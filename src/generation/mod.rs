//! Language model side of the ask path
//!
//! The retrieval core hands the generator one text payload, the prompt, and
//! gets one text back. Transport lives in the adapter.

pub mod client;

use async_trait::async_trait;

use crate::errors::Result;

pub use client::{OllamaGenerator, DEFAULT_GENERATE_MODEL, DEFAULT_OLLAMA_URL};

/// Prompt to answer mapping
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Model label for logs and reports
    fn model(&self) -> &str;
}
