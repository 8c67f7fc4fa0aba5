//! Query-time retrieval
//!
//! embed -> normalize -> exact search -> map ids back to blocks.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::corpus::Block;
use crate::embedding::{check_batch, normalize_in_place, Embedder};
use crate::errors::{Result, RetrievalError};
use crate::store::Snapshot;

/// Everything a query needs: the loaded snapshot and an embedder handle.
///
/// Built once per process and shared; nothing here is global.
#[derive(Clone)]
pub struct RetrievalContext {
    snapshot: Arc<Snapshot>,
    embedder: Arc<dyn Embedder>,
    embed_timeout: Duration,
}

impl RetrievalContext {
    pub fn new(snapshot: Snapshot, embedder: Arc<dyn Embedder>, embed_timeout: Duration) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            embedder,
            embed_timeout,
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn embed_timeout(&self) -> Duration {
        self.embed_timeout
    }
}

/// One ranked block of a query result
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedBlock<'a> {
    /// 1-based position in the result
    pub rank: usize,
    pub block_id: usize,
    pub score: f32,
    pub block: &'a Block,
}

/// Ranked blocks plus how many hits had to be dropped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalOutcome<'a> {
    pub blocks: Vec<RetrievedBlock<'a>>,
    /// Hits whose id had no block in the snapshot
    pub stale_skipped: usize,
}

impl<'a> RetrievalOutcome<'a> {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Block texts in ranked order
    pub fn texts(&self) -> Vec<&'a str> {
        self.blocks.iter().map(|b| b.block.text.as_str()).collect()
    }
}

/// Turns query text into ranked blocks against one context
pub struct Retriever {
    ctx: RetrievalContext,
}

impl Retriever {
    pub fn new(ctx: RetrievalContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &RetrievalContext {
        &self.ctx
    }

    /// Top `top_k` blocks for `query`, best first.
    ///
    /// A blank query returns nothing and never reaches the embedder.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<RetrievalOutcome<'_>> {
        let query = query.trim();
        if query.is_empty() || top_k == 0 {
            return Ok(RetrievalOutcome::default());
        }

        let mut vector = self.embed_query(query).await?;
        normalize_in_place(&mut vector, 0)?;

        let snapshot = self.ctx.snapshot();
        let result = snapshot.index.search(&vector, top_k)?;

        let mut outcome = RetrievalOutcome::default();
        for hit in result.iter() {
            match snapshot.block(hit.block_id) {
                Some(block) => outcome.blocks.push(RetrievedBlock {
                    rank: outcome.blocks.len() + 1,
                    block_id: hit.block_id,
                    score: hit.score,
                    block,
                }),
                None => {
                    warn!(
                        block_id = hit.block_id,
                        blocks = snapshot.len(),
                        "search returned id outside the block table, skipping"
                    );
                    outcome.stale_skipped += 1;
                }
            }
        }

        debug!(
            hits = outcome.len(),
            stale = outcome.stale_skipped,
            "retrieval finished"
        );
        Ok(outcome)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let timeout = self.ctx.embed_timeout;
        let batch = vec![query.to_string()];

        let mut vectors = tokio::time::timeout(timeout, self.ctx.embedder.embed(&batch))
            .await
            .map_err(|_| RetrievalError::EmbedderTimeout {
                seconds: timeout.as_secs(),
            })??;

        check_batch(&vectors, 1)?;
        Ok(vectors.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::VectorIndex;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed vector and counts calls
    struct FixedEmbedder {
        vector: Vec<f32>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl FixedEmbedder {
        fn new(vector: Vec<f32>) -> Self {
            Self {
                vector,
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(texts.iter().map(|_| self.vector.clone()).collect())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn block(text: &str, source: &str, ordinal: u32) -> Block {
        Block {
            text: text.to_string(),
            source_path: source.to_string(),
            ordinal,
        }
    }

    fn snapshot(vectors: Vec<Vec<f32>>, blocks: Vec<Block>) -> Snapshot {
        Snapshot {
            index: VectorIndex::build(vectors).unwrap(),
            blocks,
            generation: 1,
            path: PathBuf::from("snapshot-1"),
        }
    }

    fn retriever(snapshot: Snapshot, embedder: Arc<FixedEmbedder>) -> Retriever {
        Retriever::new(RetrievalContext::new(
            snapshot,
            embedder,
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn test_ranked_blocks_in_score_order() {
        let snap = snapshot(
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.6, 0.8]],
            vec![
                block("east", "a.txt", 0),
                block("north", "a.txt", 1),
                block("between", "b.txt", 0),
            ],
        );
        let retriever = retriever(snap, Arc::new(FixedEmbedder::new(vec![0.0, 2.0])));

        let outcome = retriever.retrieve("which way", 2).await.unwrap();
        assert_eq!(outcome.texts(), vec!["north", "between"]);
        assert_eq!(outcome.blocks[0].rank, 1);
        assert_eq!(outcome.blocks[1].rank, 2);
        assert_eq!(outcome.blocks[1].block_id, 2);
        assert!((outcome.blocks[0].score - 1.0).abs() < 1e-6);
        assert_eq!(outcome.stale_skipped, 0);
    }

    #[tokio::test]
    async fn test_blank_query_skips_embedder() {
        let embedder = Arc::new(FixedEmbedder::new(vec![1.0, 0.0]));
        let snap = snapshot(vec![vec![1.0, 0.0]], vec![block("only", "a.txt", 0)]);
        let retriever = retriever(snap, Arc::clone(&embedder));

        let outcome = retriever.retrieve("   \n", 5).await.unwrap();
        assert!(outcome.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_ids_are_skipped_and_counted() {
        // Three vectors but only two blocks
        let snap = snapshot(
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.8, 0.6]],
            vec![block("first", "a.txt", 0), block("second", "a.txt", 1)],
        );
        let retriever = retriever(snap, Arc::new(FixedEmbedder::new(vec![1.0, 0.0])));

        let outcome = retriever.retrieve("q", 3).await.unwrap();
        assert_eq!(outcome.stale_skipped, 1);
        assert_eq!(outcome.texts(), vec!["first", "second"]);
        assert_eq!(outcome.blocks[1].rank, 2);
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch() {
        let snap = snapshot(vec![vec![1.0, 0.0]], vec![block("only", "a.txt", 0)]);
        let retriever = retriever(snap, Arc::new(FixedEmbedder::new(vec![1.0, 0.0, 0.0])));

        assert!(matches!(
            retriever.retrieve("q", 1).await,
            Err(RetrievalError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[tokio::test]
    async fn test_zero_query_vector_rejected() {
        let snap = snapshot(vec![vec![1.0, 0.0]], vec![block("only", "a.txt", 0)]);
        let retriever = retriever(snap, Arc::new(FixedEmbedder::new(vec![0.0, 0.0])));

        assert!(matches!(
            retriever.retrieve("q", 1).await,
            Err(RetrievalError::ZeroVector { .. })
        ));
    }

    #[tokio::test]
    async fn test_embedder_timeout() {
        let mut slow = FixedEmbedder::new(vec![1.0, 0.0]);
        slow.delay = Some(Duration::from_millis(200));
        let snap = snapshot(vec![vec![1.0, 0.0]], vec![block("only", "a.txt", 0)]);
        let retriever = Retriever::new(RetrievalContext::new(
            snap,
            Arc::new(slow),
            Duration::from_millis(20),
        ));

        assert!(matches!(
            retriever.retrieve("q", 1).await,
            Err(RetrievalError::EmbedderTimeout { .. })
        ));
        // Snapshot untouched
        assert_eq!(retriever.context().snapshot().len(), 1);
    }
}
