//! ragstation - local retrieval core for a spoken question/answer installation
//!
//! Turns a folder of text documents into an exact vector index (build phase)
//! and a free-text query into ranked, attributed text blocks (search phase),
//! with an optional ask path that hands the blocks to a language model.
//!
//! # Architecture
//!
//! - **corpus**: deterministic traversal and word-bounded chunking
//! - **embedding**: `Embedder` contract plus Candle, Ollama and hashing backends
//! - **index**: exact inner-product top-k over normalized vectors
//! - **store**: atomic, versioned on-disk snapshots
//! - **rag**: retriever, prompt assembly, ask pipeline
//! - **sink**: per-query result directories and the prompt archive

pub mod errors;

pub use errors::{Result, RetrievalError};

// Retrieval core
pub mod corpus;
pub mod embedding;
pub mod index;
pub mod store;
pub mod rag;
pub mod sink;

// Build path and generator side
pub mod indexer;
pub mod generation;

// Interface layer
pub mod cli;
pub mod config;
pub mod telemetry;

pub use config::Config;
pub use corpus::{Block, Chunker, ChunkerConfig};
pub use embedding::Embedder;
pub use index::{ScoredBlock, SearchResult, VectorIndex};
pub use indexer::{BuildReport, Indexer};
pub use rag::{RetrievalContext, RetrievedBlock, Retriever};
pub use sink::{PromptArchive, ResultSink};
pub use store::{IndexStore, Snapshot, SnapshotHandle};
