//! Configuration management for ragstation
//!
//! TOML-based configuration with defaults and validation.
//! Location: ~/.ragstation/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::corpus::{ChunkerConfig, DEFAULT_MAX_WORDS};
use crate::errors::{Result, RetrievalError};
use crate::rag::PromptLanguage;

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub corpus: CorpusConfig,
    pub store: StoreConfig,
    pub embedder: EmbedderConfig,
    pub generator: GeneratorConfig,
    pub retrieval: RetrievalConfig,
    pub output: OutputConfig,
}

/// Where the documents live and how they are cut
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub root: PathBuf,
    pub max_words: usize,
    pub extensions: Vec<String>,
}

/// Snapshot location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub root: PathBuf,
}

/// Which embedding backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    /// Local BERT model via Candle
    Candle,
    /// Ollama `/api/embed`
    Ollama,
    /// Feature hashing, no model
    Hashing,
}

/// Embedding backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub kind: EmbedderKind,
    /// Hugging Face model id (candle) or Ollama model tag (ollama);
    /// unset picks the backend's default
    pub model: Option<String>,
    /// Base URL of the Ollama server (ollama kind only)
    pub ollama_url: String,
    /// Bucket count (hashing kind only)
    pub dimension: usize,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

/// Language model connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub host: String,
    pub port: u16,
    pub model: String,
    pub timeout_secs: u64,
}

/// Query-time settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Language of the prompt scaffolding
    pub language: PromptLanguage,
    /// Instructions appended after the question; unset means the persona
    /// defaults of `language`
    pub instructions: Option<Vec<String>>,
}

impl RetrievalConfig {
    pub fn instructions(&self) -> Vec<String> {
        self.instructions
            .clone()
            .unwrap_or_else(|| self.language.default_instructions())
    }
}

/// Files and directories the pipeline reads and writes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub results_dir: PathBuf,
    pub prompts_dir: PathBuf,
    pub transcript_file: PathBuf,
    pub answer_file: PathBuf,
    /// Recording copied into the prompt archive when present
    pub recording_file: Option<PathBuf>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("html_pdfs_texts"),
            max_words: DEFAULT_MAX_WORDS,
            extensions: vec!["txt".to_string()],
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("index"),
        }
    }
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            kind: EmbedderKind::Candle,
            model: None,
            ollama_url: "http://127.0.0.1:11434".to_string(),
            dimension: crate::embedding::hashing::DEFAULT_DIMENSION,
            batch_size: 32,
            timeout_secs: 120,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 11434,
            model: "llama3.2".to_string(),
            timeout_secs: 120,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            language: PromptLanguage::default(),
            instructions: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("search_results"),
            prompts_dir: PathBuf::from("PROMPTS"),
            transcript_file: PathBuf::from("transkript.txt"),
            answer_file: PathBuf::from("antwort.txt"),
            recording_file: Some(PathBuf::from("aufnahme.wav")),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(config_path) = path {
            Self::load_from_file(config_path)
        } else {
            Self::load_default()
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RetrievalError::Config(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| RetrievalError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load default configuration from standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(Config::default())
    }

    /// `~/.ragstation/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".ragstation").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.corpus.max_words == 0 {
            return Err(RetrievalError::Config(
                "corpus.max_words must be greater than 0".to_string(),
            ));
        }

        if self.corpus.extensions.is_empty() {
            return Err(RetrievalError::Config(
                "corpus.extensions must name at least one extension".to_string(),
            ));
        }

        if self.embedder.batch_size == 0 {
            return Err(RetrievalError::Config(
                "embedder.batch_size must be greater than 0".to_string(),
            ));
        }

        if self.embedder.kind == EmbedderKind::Hashing && self.embedder.dimension == 0 {
            return Err(RetrievalError::Config(
                "embedder.dimension must be greater than 0".to_string(),
            ));
        }

        if self.embedder.timeout_secs == 0 || self.generator.timeout_secs == 0 {
            return Err(RetrievalError::Config(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RetrievalError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RetrievalError::Config(format!("Failed to create config dir: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| RetrievalError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Get Ollama base URL of the generator
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.generator.host, self.generator.port)
    }

    /// Chunker settings derived from the corpus section
    pub fn chunker(&self) -> ChunkerConfig {
        ChunkerConfig {
            max_words: self.corpus.max_words,
            extensions: self.corpus.extensions.clone(),
        }
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &Path) -> PathBuf {
        if let Ok(rest) = path.strip_prefix("~") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        path.to_path_buf()
    }
}
