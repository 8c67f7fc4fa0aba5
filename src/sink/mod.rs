//! Result persistence
//!
//! Every query gets its own timestamped directory. Names are claimed with
//! `create_dir`, which fails if the directory exists, so two calls in the
//! same second end up in `<stamp>` and `<stamp>_001` instead of sharing one.

use chrono::Local;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::errors::{Result, RetrievalError};
use crate::rag::RetrievedBlock;

/// Timestamp format of result and archive directories
pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Zero padding of the same-second disambiguator
const SUFFIX_WIDTH: usize = 3;

pub const QUERY_FILE: &str = "query.txt";
pub const EMPTY_MARKER: &str = "EMPTY";
pub const BLOCKS_FILE: &str = "blocks.txt";
pub const PROMPT_FILE: &str = "prompt.txt";
pub const ANSWER_FILE: &str = "answer.txt";

/// File name of one persisted hit: `NN_score_<score>_<basename>`
pub fn result_file_name(rank: usize, score: f32, basename: &str) -> String {
    format!("{:02}_score_{:.4}_{}", rank, score, basename)
}

/// Writes query results under a root directory
#[derive(Debug, Clone)]
pub struct ResultSink {
    root: PathBuf,
}

impl ResultSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist one query and its ranked blocks; returns the new directory
    pub fn persist(&self, query: &str, results: &[RetrievedBlock<'_>]) -> Result<PathBuf> {
        let dir = create_unique_dir(&self.root, &timestamp())?;

        write_file(&dir.join(QUERY_FILE), query)?;

        if results.is_empty() {
            write_file(&dir.join(EMPTY_MARKER), "")?;
        }
        for hit in results {
            let name = result_file_name(hit.rank, hit.score, hit.block.source_basename());
            write_file(&dir.join(name), &hit.block.text)?;
        }

        info!(dir = %dir.display(), hits = results.len(), "results saved");
        Ok(dir)
    }
}

/// Keeps the prompt, its blocks, the answer and the recording of an ask
#[derive(Debug, Clone)]
pub struct PromptArchive {
    root: PathBuf,
}

impl PromptArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `blocks.txt` and `prompt.txt` into a fresh directory
    pub fn archive<S: AsRef<str>>(&self, prompt: &str, blocks: &[S]) -> Result<PathBuf> {
        let dir = create_unique_dir(&self.root, &timestamp())?;

        let listing: String = blocks
            .iter()
            .enumerate()
            .map(|(i, block)| format!("Block {}:\n{}\n\n", i + 1, block.as_ref()))
            .collect();
        write_file(&dir.join(BLOCKS_FILE), &listing)?;
        write_file(&dir.join(PROMPT_FILE), prompt)?;

        debug!(dir = %dir.display(), blocks = blocks.len(), "prompt archived");
        Ok(dir)
    }

    /// Store the generator's answer next to its prompt
    pub fn attach_answer(&self, dir: &Path, answer: &str) -> Result<PathBuf> {
        let path = dir.join(ANSWER_FILE);
        write_file(&path, answer)?;
        Ok(path)
    }

    /// Copy `source` into the archive directory if it exists.
    ///
    /// Returns the copy's path, or `None` when there was nothing to copy.
    pub fn attach_file(&self, dir: &Path, source: &Path) -> Result<Option<PathBuf>> {
        let name = match source.file_name() {
            Some(name) if source.is_file() => name,
            _ => return Ok(None),
        };
        let target = dir.join(name);
        fs::copy(source, &target).map_err(|e| RetrievalError::io(source, e))?;
        Ok(Some(target))
    }
}

fn timestamp() -> String {
    Local::now().format(STAMP_FORMAT).to_string()
}

/// Claim `<root>/<stamp>`, or `<stamp>_<nnn>` one past the highest suffix
/// already taken for that stamp, so names sort in creation order
fn create_unique_dir(root: &Path, stamp: &str) -> Result<PathBuf> {
    fs::create_dir_all(root).map_err(|e| RetrievalError::io(root, e))?;

    let mut suffix = next_suffix(root, stamp)?;
    loop {
        let name = if suffix == 0 {
            stamp.to_string()
        } else {
            format!("{}_{:0width$}", stamp, suffix, width = SUFFIX_WIDTH)
        };
        let dir = root.join(name);
        match fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => return Err(RetrievalError::io(dir, e)),
        }
    }
}

/// 0 when nothing carries `stamp` yet, else one past the highest suffix
fn next_suffix(root: &Path, stamp: &str) -> Result<usize> {
    let prefix = format!("{}_", stamp);
    let mut highest: Option<usize> = None;

    for entry in fs::read_dir(root).map_err(|e| RetrievalError::io(root, e))? {
        let entry = entry.map_err(|e| RetrievalError::io(root, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let taken = if name == stamp {
            Some(0)
        } else {
            name.strip_prefix(&prefix)
                .filter(|rest| rest.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|rest| rest.parse::<usize>().ok())
        };
        if let Some(n) = taken {
            highest = Some(highest.map_or(n, |h| h.max(n)));
        }
    }

    Ok(highest.map_or(0, |h| h + 1))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|e| RetrievalError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Block;
    use tempfile::TempDir;

    fn block(text: &str, source: &str) -> Block {
        Block {
            text: text.to_string(),
            source_path: source.to_string(),
            ordinal: 0,
        }
    }

    #[test]
    fn test_result_file_name() {
        assert_eq!(result_file_name(1, 0.87654, "notes.txt"), "01_score_0.8765_notes.txt");
        assert_eq!(result_file_name(12, -0.5, "x.txt"), "12_score_-0.5000_x.txt");
    }

    #[test]
    fn test_persist_writes_query_and_hits() {
        let temp = TempDir::new().unwrap();
        let sink = ResultSink::new(temp.path().join("results"));
        let a = block("first text", "corpus/a.txt");
        let b = block("second text", "corpus/sub/b.txt");
        let hits = vec![
            RetrievedBlock { rank: 1, block_id: 3, score: 0.9, block: &b },
            RetrievedBlock { rank: 2, block_id: 1, score: 0.5, block: &a },
        ];

        let dir = sink.persist("what is x", &hits).unwrap();
        assert_eq!(fs::read_to_string(dir.join(QUERY_FILE)).unwrap(), "what is x");
        assert_eq!(
            fs::read_to_string(dir.join("01_score_0.9000_b.txt")).unwrap(),
            "second text"
        );
        assert_eq!(
            fs::read_to_string(dir.join("02_score_0.5000_a.txt")).unwrap(),
            "first text"
        );
        assert!(!dir.join(EMPTY_MARKER).exists());
    }

    #[test]
    fn test_empty_results_write_marker() {
        let temp = TempDir::new().unwrap();
        let sink = ResultSink::new(temp.path());

        let dir = sink.persist("nothing", &[]).unwrap();
        assert!(dir.join(QUERY_FILE).exists());
        assert!(dir.join(EMPTY_MARKER).exists());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 2);
    }

    #[test]
    fn test_same_stamp_gets_suffix() {
        let temp = TempDir::new().unwrap();
        let first = create_unique_dir(temp.path(), "20250101_120000").unwrap();
        let second = create_unique_dir(temp.path(), "20250101_120000").unwrap();
        let third = create_unique_dir(temp.path(), "20250101_120000").unwrap();

        assert!(first.ends_with("20250101_120000"));
        assert!(second.ends_with("20250101_120000_001"));
        assert!(third.ends_with("20250101_120000_002"));
    }

    #[test]
    fn test_same_stamp_dirs_sort_in_creation_order() {
        let temp = TempDir::new().unwrap();
        let created: Vec<PathBuf> = (0..12)
            .map(|_| create_unique_dir(temp.path(), "20250101_120000").unwrap())
            .collect();

        let mut sorted = created.clone();
        sorted.sort();
        assert_eq!(sorted, created);
        assert!(created[11].ends_with("20250101_120000_011"));
    }

    #[test]
    fn test_removed_suffix_is_not_reused() {
        let temp = TempDir::new().unwrap();
        let stamp = "20250101_120000";
        let _a = create_unique_dir(temp.path(), stamp).unwrap();
        let b = create_unique_dir(temp.path(), stamp).unwrap();
        let c = create_unique_dir(temp.path(), stamp).unwrap();
        fs::remove_dir(&b).unwrap();

        let d = create_unique_dir(temp.path(), stamp).unwrap();
        assert!(d > c);
        assert!(d.ends_with("20250101_120000_003"));

        // Other stamps and stray names do not count
        fs::create_dir(temp.path().join("20250101_120000_notes")).unwrap();
        let other = create_unique_dir(temp.path(), "20250101_120001").unwrap();
        assert!(other.ends_with("20250101_120001"));
    }

    #[test]
    fn test_concurrent_persist_never_shares_dir() {
        let temp = TempDir::new().unwrap();
        let sink = ResultSink::new(temp.path());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sink = sink.clone();
                std::thread::spawn(move || sink.persist(&format!("q{}", i), &[]).unwrap())
            })
            .collect();
        let mut dirs: Vec<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        dirs.sort();
        dirs.dedup();
        assert_eq!(dirs.len(), 8);
    }

    #[test]
    fn test_prompt_archive() {
        let temp = TempDir::new().unwrap();
        let archive = PromptArchive::new(temp.path().join("PROMPTS"));

        let dir = archive.archive("the prompt", &["one", "two"]).unwrap();
        assert_eq!(
            fs::read_to_string(dir.join(BLOCKS_FILE)).unwrap(),
            "Block 1:\none\n\nBlock 2:\ntwo\n\n"
        );
        assert_eq!(fs::read_to_string(dir.join(PROMPT_FILE)).unwrap(), "the prompt");

        archive.attach_answer(&dir, "the answer").unwrap();
        assert_eq!(fs::read_to_string(dir.join(ANSWER_FILE)).unwrap(), "the answer");
    }

    #[test]
    fn test_attach_file_copies_when_present() {
        let temp = TempDir::new().unwrap();
        let archive = PromptArchive::new(temp.path().join("PROMPTS"));
        let dir = archive.archive::<&str>("p", &[]).unwrap();

        let recording = temp.path().join("recording.wav");
        assert_eq!(archive.attach_file(&dir, &recording).unwrap(), None);

        fs::write(&recording, b"RIFF").unwrap();
        let copied = archive.attach_file(&dir, &recording).unwrap().unwrap();
        assert_eq!(fs::read(copied).unwrap(), b"RIFF");
    }
}
