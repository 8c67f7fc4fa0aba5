//! Retrieval-augmented generation
//!
//! - Retriever: query text to ranked blocks of the loaded snapshot
//! - Prompt: numbered-context prompt for the generator
//! - Pipeline: the ask flow, retrieval through archived answer

pub mod pipeline;
pub mod prompt;
pub mod retriever;

pub use pipeline::{read_transcript, AskConfig, AskOutcome, AskPipeline};
pub use prompt::{build_prompt, PromptLanguage};
pub use retriever::{RetrievalContext, RetrievalOutcome, RetrievedBlock, Retriever};
