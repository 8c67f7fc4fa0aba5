//! Ask pipeline: query -> retrieve -> prompt -> archive -> generate -> answer
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::errors::{Result, RetrievalError};
use crate::generation::Generator;
use crate::rag::prompt::{build_prompt, PromptLanguage};
use crate::rag::retriever::Retriever;
use crate::sink::PromptArchive;
use crate::telemetry::{Stage, StageTimings};

/// Ask pipeline configuration
#[derive(Debug, Clone)]
pub struct AskConfig {
    pub top_k: usize,
    pub language: PromptLanguage,
    /// Persona/style instructions appended to every prompt
    pub instructions: Vec<String>,
    pub generate_timeout: Duration,
    /// Where the plain answer is written for downstream consumers
    pub answer_file: Option<PathBuf>,
    /// Artifact copied into the prompt archive when it exists
    pub recording_file: Option<PathBuf>,
}

impl Default for AskConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            language: PromptLanguage::default(),
            instructions: PromptLanguage::default().default_instructions(),
            generate_timeout: Duration::from_secs(120),
            answer_file: None,
            recording_file: None,
        }
    }
}

/// What one ask produced
#[derive(Debug, Clone)]
pub struct AskOutcome {
    pub query: String,
    pub prompt: String,
    pub answer: String,
    pub archive_dir: PathBuf,
    pub blocks_used: usize,
    pub stale_skipped: usize,
}

/// End-to-end ask pipeline
pub struct AskPipeline {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    archive: PromptArchive,
    config: AskConfig,
}

impl AskPipeline {
    pub fn new(
        retriever: Retriever,
        generator: Arc<dyn Generator>,
        archive: PromptArchive,
        config: AskConfig,
    ) -> Self {
        Self {
            retriever,
            generator,
            archive,
            config,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn config(&self) -> &AskConfig {
        &self.config
    }

    /// Answer `query` from the corpus.
    ///
    /// The prompt and its blocks are archived before the generator is
    /// called, so a failed generation still leaves a record of what was
    /// asked.
    pub async fn ask(&self, query: &str, timings: &mut StageTimings) -> Result<AskOutcome> {
        let query = query.trim();

        let start = Instant::now();
        let outcome = self.retriever.retrieve(query, self.config.top_k).await?;
        timings.record(Stage::EmbedAndSearch, start.elapsed());

        let texts = outcome.texts();
        let prompt = build_prompt(query, &texts, self.config.language, &self.config.instructions);
        let archive_dir = self.archive.archive(&prompt, &texts)?;

        let start = Instant::now();
        let answer = self.generate(&prompt).await?;
        timings.record(Stage::Generate, start.elapsed());

        let start = Instant::now();
        if let Some(path) = &self.config.answer_file {
            fs::write(path, &answer).map_err(|e| RetrievalError::io(path, e))?;
        }
        self.archive.attach_answer(&archive_dir, &answer)?;
        if let Some(recording) = &self.config.recording_file {
            self.archive.attach_file(&archive_dir, recording)?;
        }
        timings.record(Stage::Persist, start.elapsed());

        info!(
            model = self.generator.model(),
            blocks = texts.len(),
            dir = %archive_dir.display(),
            "answer archived"
        );

        Ok(AskOutcome {
            query: query.to_string(),
            prompt,
            answer,
            archive_dir,
            blocks_used: texts.len(),
            stale_skipped: outcome.stale_skipped,
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let timeout = self.config.generate_timeout;
        tokio::time::timeout(timeout, self.generator.generate(prompt))
            .await
            .map_err(|_| RetrievalError::GeneratorTimeout {
                seconds: timeout.as_secs(),
            })?
    }
}

/// Read the query from a transcript file, trimmed
pub fn read_transcript(path: &Path) -> Result<String> {
    let text = fs::read_to_string(path).map_err(|e| RetrievalError::io(path, e))?;
    Ok(text.trim().to_string())
}
