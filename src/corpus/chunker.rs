//! Document Chunking
//!
//! Walks a corpus directory and splits every text file into word-bounded
//! blocks. Traversal order is deterministic (files of a directory in lexical
//! order, then its subdirectories in lexical order) so that rebuilding an
//! unchanged corpus assigns the same block ids.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::errors::{Result, RetrievalError};

/// Default maximum number of words per block
pub const DEFAULT_MAX_WORDS: usize = 300;

/// A word-bounded span of one paragraph of one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Words of the span, joined by single spaces
    pub text: String,
    /// Path of the source file as seen during traversal
    pub source_path: String,
    /// Position of this block within its source file
    pub ordinal: u32,
}

impl Block {
    /// File name of the source, used to label persisted results
    pub fn source_basename(&self) -> &str {
        Path::new(&self.source_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.source_path)
    }

    /// Number of whitespace-separated words in the block
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Chunker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Maximum words per block
    pub max_words: usize,
    /// File extensions (without dot, case-insensitive) that count as text
    pub extensions: Vec<String>,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_words: DEFAULT_MAX_WORDS,
            extensions: vec!["txt".to_string()],
        }
    }
}

/// What happened to one file during chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum FileOutcome {
    /// File was read and produced `blocks` blocks (possibly zero)
    Chunked { path: PathBuf, blocks: usize },
    /// File or directory could not be read
    Skipped { path: PathBuf, reason: String },
}

impl FileOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, FileOutcome::Skipped { .. })
    }
}

/// Per-file outcomes of one chunking pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkReport {
    pub outcomes: Vec<FileOutcome>,
}

impl ChunkReport {
    pub fn files_seen(&self) -> usize {
        self.outcomes.len()
    }

    pub fn files_skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_skipped()).count()
    }

    /// Number of distinct files that contributed at least one block
    pub fn files_with_blocks(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, FileOutcome::Chunked { blocks, .. } if *blocks > 0))
            .count()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| o.is_skipped())
    }
}

/// Ordered blocks of a corpus plus the report of how they were obtained
#[derive(Debug, Clone)]
pub struct ChunkedCorpus {
    pub blocks: Vec<Block>,
    pub report: ChunkReport,
}

/// Corpus chunker
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Create a chunker, rejecting a zero word budget
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        if config.max_words == 0 {
            return Err(RetrievalError::Config(
                "max_words must be greater than 0".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk every matching file under `root`.
    ///
    /// Unreadable files and subdirectories are skipped and reported. Fails
    /// with `EmptyCorpus` when nothing produced a block, and with `Io` when
    /// `root` itself cannot be listed.
    pub fn chunk_dir(&self, root: &Path) -> Result<ChunkedCorpus> {
        let mut blocks = Vec::new();
        let mut report = ChunkReport::default();

        let entries = sorted_entries(root).map_err(|e| RetrievalError::io(root, e))?;
        self.walk(entries, &mut blocks, &mut report);

        if blocks.is_empty() {
            return Err(RetrievalError::EmptyCorpus {
                root: root.to_path_buf(),
                files_seen: report.files_seen(),
                files_skipped: report.files_skipped(),
            });
        }

        debug!(
            blocks = blocks.len(),
            files = report.files_with_blocks(),
            "chunked corpus"
        );
        Ok(ChunkedCorpus { blocks, report })
    }

    fn walk(&self, entries: DirEntries, blocks: &mut Vec<Block>, report: &mut ChunkReport) {
        report.outcomes.extend(entries.failed);

        for path in entries.files {
            if !self.accepts(&path) {
                continue;
            }
            match fs::read_to_string(&path) {
                Ok(content) => {
                    let source = path.to_string_lossy().to_string();
                    let produced = chunk_text(&content, &source, self.config.max_words);
                    report.outcomes.push(FileOutcome::Chunked {
                        path,
                        blocks: produced.len(),
                    });
                    blocks.extend(produced);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable file");
                    report.outcomes.push(FileOutcome::Skipped {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        for dir in entries.dirs {
            match sorted_entries(&dir) {
                Ok(children) => self.walk(children, blocks, report),
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "skipping unreadable directory");
                    report.outcomes.push(FileOutcome::Skipped {
                        path: dir,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        self.config
            .extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&ext))
    }
}

#[derive(Default)]
struct DirEntries {
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
    /// Entries whose name or type could not be read
    failed: Vec<FileOutcome>,
}

impl DirEntries {
    fn fail(&mut self, path: PathBuf, error: std::io::Error) {
        warn!(path = %path.display(), error = %error, "skipping unreadable entry");
        self.failed.push(FileOutcome::Skipped {
            path,
            reason: error.to_string(),
        });
    }
}

/// List a directory, split into files and subdirectories, each sorted by name.
/// Symlinks are followed for files; symlinked directories are not descended.
/// Only a failure to open `dir` itself is an error; a bad entry is recorded
/// in `failed` and the listing goes on.
fn sorted_entries(dir: &Path) -> std::io::Result<DirEntries> {
    let mut entries = DirEntries::default();

    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                entries.fail(dir.to_path_buf(), e);
                continue;
            }
        };
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(e) => {
                entries.fail(path, e);
                continue;
            }
        };

        if file_type.is_dir() {
            entries.dirs.push(path);
        } else if file_type.is_file() {
            entries.files.push(path);
        } else if file_type.is_symlink() {
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => entries.files.push(path),
                Ok(_) => debug!(path = %path.display(), "not following directory symlink"),
                Err(e) => debug!(path = %path.display(), error = %e, "dangling symlink"),
            }
        }
    }

    entries.files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    entries.dirs.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(entries)
}

/// Split one document into blocks of at most `max_words` words.
///
/// Paragraphs are separated by blank (empty or whitespace-only) lines. A
/// paragraph longer than `max_words` becomes several consecutive blocks.
pub fn chunk_text(content: &str, source_path: &str, max_words: usize) -> Vec<Block> {
    let max_words = max_words.max(1);
    let mut blocks = Vec::new();
    let mut ordinal = 0u32;

    for paragraph in paragraphs(content.trim()) {
        for text in split_words(&paragraph, max_words) {
            blocks.push(Block {
                text,
                source_path: source_path.to_string(),
                ordinal,
            });
            ordinal += 1;
        }
    }

    blocks
}

/// Paragraph word lists, blank lines acting as separators
fn paragraphs(content: &str) -> Vec<Vec<&str>> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.extend(line.split_whitespace());
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs
}

fn split_words(words: &[&str], max_words: usize) -> Vec<String> {
    words.chunks(max_words).map(|chunk| chunk.join(" ")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_chunk_text_paragraphs() {
        let blocks = chunk_text("First para.\n\nSecond   para\nstill second.\n", "a.txt", 300);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "First para.");
        assert_eq!(blocks[1].text, "Second para still second.");
        assert_eq!(blocks[1].ordinal, 1);
    }

    #[test]
    fn test_chunk_text_splits_long_paragraph() {
        let words: Vec<String> = (0..7).map(|i| format!("w{}", i)).collect();
        let blocks = chunk_text(&words.join(" "), "a.txt", 3);
        let texts: Vec<&str> = blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["w0 w1 w2", "w3 w4 w5", "w6"]);
    }

    #[test]
    fn test_whitespace_only_lines_separate_paragraphs() {
        let blocks = chunk_text("one\n   \t\ntwo\r\n\r\nthree", "a.txt", 300);
        let texts: Vec<&str> = blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_empty_content_yields_nothing() {
        assert!(chunk_text("  \n\n \n", "a.txt", 300).is_empty());
    }

    #[test]
    fn test_zero_max_words_rejected() {
        let config = ChunkerConfig {
            max_words: 0,
            ..Default::default()
        };
        assert!(matches!(Chunker::new(config), Err(RetrievalError::Config(_))));
    }

    #[test]
    fn test_traversal_order_files_then_subdirs() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "b.txt", "bee");
        write(temp.path(), "a.txt", "ay");
        write(temp.path(), "a_dir/z.txt", "zed");
        write(temp.path(), "0_dir/c.txt", "see");
        write(temp.path(), "notes.md", "ignored");

        let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
        let corpus = chunker.chunk_dir(temp.path()).unwrap();
        let texts: Vec<&str> = corpus.blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["ay", "bee", "see", "zed"]);
        assert_eq!(corpus.report.files_seen(), 4);
    }

    #[test]
    fn test_invalid_utf8_is_skipped_not_fatal() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "good.txt", "fine words");
        fs::write(temp.path().join("bad.txt"), [0xff, 0xfe, 0x00, 0xc3]).unwrap();

        let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
        let corpus = chunker.chunk_dir(temp.path()).unwrap();
        assert_eq!(corpus.blocks.len(), 1);
        assert_eq!(corpus.report.files_skipped(), 1);
        assert!(corpus.report.skipped().any(|o| matches!(
            o,
            FileOutcome::Skipped { path, .. } if path.ends_with("bad.txt")
        )));
    }

    #[test]
    fn test_unreadable_entry_is_skipped_not_fatal() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.txt", "ay");
        write(temp.path(), "sub/b.txt", "bee");

        let mut entries = sorted_entries(temp.path()).unwrap();
        entries.fail(
            temp.path().join("locked"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );

        let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
        let mut blocks = Vec::new();
        let mut report = ChunkReport::default();
        chunker.walk(entries, &mut blocks, &mut report);

        let texts: Vec<&str> = blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["ay", "bee"]);
        assert_eq!(report.files_skipped(), 1);
        assert!(report.skipped().any(|o| matches!(
            o,
            FileOutcome::Skipped { path, .. } if path.ends_with("locked")
        )));
    }

    #[test]
    fn test_empty_corpus_error() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "blank.txt", "\n\n   \n");
        fs::write(temp.path().join("bad.txt"), [0xff, 0xfe]).unwrap();

        let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
        match chunker.chunk_dir(temp.path()) {
            Err(RetrievalError::EmptyCorpus {
                files_seen,
                files_skipped,
                ..
            }) => {
                assert_eq!(files_seen, 2);
                assert_eq!(files_skipped, 1);
            }
            other => panic!("expected EmptyCorpus, got {:?}", other.map(|c| c.blocks.len())),
        }
    }

    #[test]
    fn test_missing_root_is_io_error() {
        let temp = TempDir::new().unwrap();
        let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
        let result = chunker.chunk_dir(&temp.path().join("nope"));
        assert!(matches!(result, Err(RetrievalError::Io { .. })));
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "LOUD.TXT", "shout");
        let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
        assert_eq!(chunker.chunk_dir(temp.path()).unwrap().blocks.len(), 1);
    }

    #[test]
    fn test_source_basename() {
        let block = Block {
            text: "x".to_string(),
            source_path: "corpus/sub/essay.txt".to_string(),
            ordinal: 0,
        };
        assert_eq!(block.source_basename(), "essay.txt");
    }
}
