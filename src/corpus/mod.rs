//! Corpus handling: directory traversal and word-bounded chunking.

pub mod chunker;

pub use chunker::{
    chunk_text, Block, ChunkReport, ChunkedCorpus, Chunker, ChunkerConfig, FileOutcome,
    DEFAULT_MAX_WORDS,
};
