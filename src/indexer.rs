//! Build path: corpus -> blocks -> embeddings -> index -> snapshot
//!
//! Nothing touches the store until the whole index is built in memory, so a
//! failed or timed-out embedding leaves the committed snapshot as it was.

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::corpus::{Block, ChunkReport, Chunker};
use crate::embedding::{check_batch, normalize_in_place, Embedder};
use crate::errors::{Result, RetrievalError};
use crate::index::VectorIndex;
use crate::store::IndexStore;
use crate::telemetry::{Stage, StageTimings};

/// What a build produced
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub corpus_root: PathBuf,
    pub chunks: ChunkReport,
    pub blocks: usize,
    pub dimension: usize,
    pub generation: u64,
    pub snapshot_path: PathBuf,
    pub embedder: String,
}

impl BuildReport {
    /// Files that contributed at least one block
    pub fn source_files(&self) -> usize {
        self.chunks.files_with_blocks()
    }
}

/// Runs one full rebuild of the index
pub struct Indexer {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    store: IndexStore,
    batch_size: usize,
    embed_timeout: Duration,
    show_progress: bool,
}

impl Indexer {
    pub fn new(chunker: Chunker, embedder: Arc<dyn Embedder>, store: IndexStore) -> Self {
        Self {
            chunker,
            embedder,
            store,
            batch_size: 32,
            embed_timeout: Duration::from_secs(120),
            show_progress: false,
        }
    }

    /// Texts per embedder call (at least 1)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Deadline for each embedder call
    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Chunk, embed, index and atomically save the corpus under `root`
    pub async fn build(&self, root: &Path, timings: &mut StageTimings) -> Result<BuildReport> {
        let corpus = timings.time(Stage::Chunk, || self.chunker.chunk_dir(root))?;
        info!(
            blocks = corpus.blocks.len(),
            files = corpus.report.files_with_blocks(),
            skipped = corpus.report.files_skipped(),
            "chunked corpus"
        );

        let start = Instant::now();
        let vectors = self.embed_blocks(&corpus.blocks).await?;
        timings.record(Stage::Embed, start.elapsed());

        let index = timings.time(Stage::IndexBuild, || VectorIndex::build(vectors))?;
        let handle = timings.time(Stage::Save, || self.store.save(&index, &corpus.blocks))?;

        Ok(BuildReport {
            corpus_root: root.to_path_buf(),
            chunks: corpus.report,
            blocks: handle.blocks,
            dimension: handle.dimension,
            generation: handle.generation,
            snapshot_path: handle.path,
            embedder: self.embedder.name().to_string(),
        })
    }

    /// Embed every block in batches and normalize the results
    async fn embed_blocks(&self, blocks: &[Block]) -> Result<Vec<Vec<f32>>> {
        let progress = self.progress_bar(blocks.len() as u64);
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(blocks.len());
        let mut dimension: Option<usize> = None;

        for batch in blocks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|b| b.text.clone()).collect();

            let embedded = tokio::time::timeout(self.embed_timeout, self.embedder.embed(&texts))
                .await
                .map_err(|_| RetrievalError::EmbedderTimeout {
                    seconds: self.embed_timeout.as_secs(),
                })??;

            let batch_dim = check_batch(&embedded, texts.len())?;
            match dimension {
                None => dimension = Some(batch_dim),
                Some(expected) if expected != batch_dim => {
                    return Err(RetrievalError::DimensionMismatch {
                        expected,
                        actual: batch_dim,
                    })
                }
                Some(_) => {}
            }

            for mut v in embedded {
                normalize_in_place(&mut v, vectors.len())?;
                vectors.push(v);
            }
            progress.inc(batch.len() as u64);
        }

        progress.finish_and_clear();
        Ok(vectors)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.cyan} Embedding [{bar:40.cyan/blue}] {pos}/{len} blocks ({eta})")
        {
            pb.set_style(style.progress_chars("=>-"));
        }
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::ChunkerConfig;
    use crate::embedding::{is_unit, HashingEmbedder};
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    fn corpus(temp: &TempDir) -> PathBuf {
        let root = temp.path().join("corpus");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.txt"), "piano strings\n\nwhite noise field").unwrap();
        fs::write(root.join("b.txt"), "listening to rain").unwrap();
        root
    }

    fn indexer(temp: &TempDir, embedder: Arc<dyn Embedder>) -> Indexer {
        Indexer::new(
            Chunker::new(ChunkerConfig::default()).unwrap(),
            embedder,
            IndexStore::new(temp.path().join("index")),
        )
        .with_batch_size(2)
    }

    #[tokio::test]
    async fn test_build_saves_loadable_snapshot() {
        let temp = TempDir::new().unwrap();
        let root = corpus(&temp);
        let indexer = indexer(&temp, Arc::new(HashingEmbedder::new(64).unwrap()));

        let mut timings = StageTimings::new();
        let report = indexer.build(&root, &mut timings).await.unwrap();
        assert_eq!(report.blocks, 3);
        assert_eq!(report.dimension, 64);
        assert_eq!(report.source_files(), 2);
        assert_eq!(report.embedder, "hashing");

        let snapshot = indexer.store().load().unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.blocks[2].text, "listening to rain");
        assert_eq!(timings.entries().len(), 4);

        // Raw hashing vectors are term counts; stored ones are unit length
        let raw = HashingEmbedder::new(64).unwrap().embed_one("piano strings");
        assert!(!is_unit(&raw));
        for i in 0..snapshot.len() {
            assert!(is_unit(snapshot.index.vector(i).unwrap()));
        }
    }

    #[tokio::test]
    async fn test_empty_corpus_fails_without_snapshot() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("empty");
        fs::create_dir_all(&root).unwrap();
        let indexer = indexer(&temp, Arc::new(HashingEmbedder::default()));

        let result = indexer.build(&root, &mut StageTimings::new()).await;
        assert!(matches!(result, Err(RetrievalError::EmptyCorpus { .. })));
        assert!(!indexer.store().has_snapshot());
    }

    /// Changes dimensionality after the first call
    struct DriftingEmbedder {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Embedder for DriftingEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let dim = if n == 0 { 3 } else { 4 };
            Ok(texts.iter().map(|_| vec![1.0; dim]).collect())
        }

        fn name(&self) -> &str {
            "drifting"
        }
    }

    #[tokio::test]
    async fn test_dimension_drift_between_batches() {
        let temp = TempDir::new().unwrap();
        let root = corpus(&temp);
        let indexer = indexer(
            &temp,
            Arc::new(DriftingEmbedder {
                calls: Default::default(),
            }),
        );

        let result = indexer.build(&root, &mut StageTimings::new()).await;
        assert!(matches!(
            result,
            Err(RetrievalError::DimensionMismatch { expected: 3, actual: 4 })
        ));
        assert!(!indexer.store().has_snapshot());
    }

    /// Never answers in time
    struct StuckEmbedder;

    #[async_trait]
    impl Embedder for StuckEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "stuck"
        }
    }

    #[tokio::test]
    async fn test_timeout_leaves_previous_snapshot() {
        let temp = TempDir::new().unwrap();
        let root = corpus(&temp);

        let good = indexer(&temp, Arc::new(HashingEmbedder::new(16).unwrap()));
        let first = good.build(&root, &mut StageTimings::new()).await.unwrap();

        let stuck = indexer(&temp, Arc::new(StuckEmbedder))
            .with_embed_timeout(Duration::from_millis(20));
        let result = stuck.build(&root, &mut StageTimings::new()).await;
        assert!(matches!(result, Err(RetrievalError::EmbedderTimeout { .. })));

        let snapshot = stuck.store().load().unwrap();
        assert_eq!(snapshot.generation, first.generation);
    }
}
