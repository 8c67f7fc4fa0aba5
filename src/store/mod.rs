//! Durable snapshot storage
//!
//! A snapshot is the triple (vector index, block texts, provenance) and is
//! written and read as a unit. Each save goes to a fresh staging directory,
//! is renamed to a new generation directory, and becomes visible only when
//! the `CURRENT` pointer is atomically replaced. Readers therefore see either
//! the previous complete generation or the new one, never a mix.
//!
//! ```text
//! <root>/CURRENT
//! <root>/snapshot-<gen>/{vectors.bin, blocks.json, provenance.json}
//! <root>/.staging-<uuid>/
//! ```

pub mod format;

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::corpus::Block;
use crate::errors::{Result, RetrievalError};
use crate::index::VectorIndex;
use format::{ProvenanceRecord, BLOCKS_FORMAT, PROVENANCE_FORMAT};

pub const CURRENT_FILE: &str = "CURRENT";
const SNAPSHOT_PREFIX: &str = "snapshot-";
const STAGING_PREFIX: &str = ".staging-";

/// The three files of a snapshot, in the order they are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Vectors,
    Blocks,
    Provenance,
}

impl Artifact {
    pub const ALL: [Artifact; 3] = [Artifact::Vectors, Artifact::Blocks, Artifact::Provenance];

    pub fn file_name(self) -> &'static str {
        match self {
            Artifact::Vectors => "vectors.bin",
            Artifact::Blocks => "blocks.json",
            Artifact::Provenance => "provenance.json",
        }
    }
}

/// Where a committed snapshot lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHandle {
    pub generation: u64,
    pub path: PathBuf,
    pub blocks: usize,
    pub dimension: usize,
}

/// A loaded, internally consistent snapshot
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub index: VectorIndex,
    pub blocks: Vec<Block>,
    pub generation: u64,
    pub path: PathBuf,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block(&self, block_id: usize) -> Option<&Block> {
        self.blocks.get(block_id)
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }
}

/// Snapshot store rooted at one directory
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Atomically replace the current snapshot with (index, blocks)
    pub fn save(&self, index: &VectorIndex, blocks: &[Block]) -> Result<SnapshotHandle> {
        if index.len() != blocks.len() {
            return Err(RetrievalError::corrupt(
                &self.root,
                format!(
                    "refusing to save {} vectors with {} blocks",
                    index.len(),
                    blocks.len()
                ),
            ));
        }
        if blocks.is_empty() {
            return Err(RetrievalError::corrupt(
                &self.root,
                "refusing to save an empty snapshot",
            ));
        }

        fs::create_dir_all(&self.root).map_err(|e| RetrievalError::io(&self.root, e))?;

        let staging = self.stage(index, blocks, None)?;
        let generation = self.next_generation()?;
        let final_dir = self.root.join(generation_dir_name(generation));

        fs::rename(&staging, &final_dir).map_err(|e| RetrievalError::io(&final_dir, e))?;
        self.commit(&final_dir)?;

        info!(
            generation,
            blocks = blocks.len(),
            dimension = index.dimension(),
            "committed snapshot"
        );

        self.remove_superseded(generation);

        Ok(SnapshotHandle {
            generation,
            path: final_dir,
            blocks: blocks.len(),
            dimension: index.dimension(),
        })
    }

    /// Load the committed snapshot
    pub fn load(&self) -> Result<Snapshot> {
        let dir = self.current_dir()?;
        let generation = parse_generation(&dir).ok_or_else(|| {
            RetrievalError::corrupt(&dir, "CURRENT names an invalid generation")
        })?;

        let vectors_path = dir.join(Artifact::Vectors.file_name());
        let blocks_path = dir.join(Artifact::Blocks.file_name());
        let provenance_path = dir.join(Artifact::Provenance.file_name());

        let index = format::decode_vectors(&read_artifact(&vectors_path)?, &vectors_path)?;
        let texts: Vec<String> =
            format::decode_table(&read_artifact(&blocks_path)?, BLOCKS_FORMAT, &blocks_path)?;
        let provenance: Vec<ProvenanceRecord> = format::decode_table(
            &read_artifact(&provenance_path)?,
            PROVENANCE_FORMAT,
            &provenance_path,
        )?;

        if index.len() != texts.len() || texts.len() != provenance.len() {
            return Err(RetrievalError::corrupt(
                &dir,
                format!(
                    "record counts disagree: {} vectors, {} blocks, {} provenance entries",
                    index.len(),
                    texts.len(),
                    provenance.len()
                ),
            ));
        }

        let blocks = texts
            .into_iter()
            .zip(provenance)
            .map(|(text, p)| Block {
                text,
                source_path: p.source_path,
                ordinal: p.ordinal,
            })
            .collect();

        debug!(generation, path = %dir.display(), "loaded snapshot");

        Ok(Snapshot {
            index,
            blocks,
            generation,
            path: dir,
        })
    }

    /// Whether a snapshot has ever been committed here
    pub fn has_snapshot(&self) -> bool {
        self.root.join(CURRENT_FILE).is_file()
    }

    /// Write the artifacts into a fresh staging directory.
    ///
    /// `stop_after` cuts the write short after the named artifact, leaving
    /// the staging directory as a crashed save would.
    pub(crate) fn stage(
        &self,
        index: &VectorIndex,
        blocks: &[Block],
        stop_after: Option<Artifact>,
    ) -> Result<PathBuf> {
        let staging = self
            .root
            .join(format!("{}{}", STAGING_PREFIX, uuid::Uuid::new_v4()));
        fs::create_dir(&staging).map_err(|e| RetrievalError::io(&staging, e))?;

        for artifact in Artifact::ALL {
            let bytes = match artifact {
                Artifact::Vectors => format::encode_vectors(index),
                Artifact::Blocks => format::encode_table(
                    BLOCKS_FORMAT,
                    blocks.iter().map(|b| b.text.as_str()).collect::<Vec<_>>(),
                )?,
                Artifact::Provenance => format::encode_table(
                    PROVENANCE_FORMAT,
                    blocks
                        .iter()
                        .map(|b| ProvenanceRecord {
                            source_path: b.source_path.clone(),
                            ordinal: b.ordinal,
                        })
                        .collect::<Vec<_>>(),
                )?,
            };
            write_synced(&staging.join(artifact.file_name()), &bytes)?;

            if stop_after == Some(artifact) {
                return Ok(staging);
            }
        }

        sync_dir(&staging);
        Ok(staging)
    }

    /// Point CURRENT at `dir` (rename-over, the commit point)
    fn commit(&self, dir: &Path) -> Result<()> {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RetrievalError::corrupt(dir, "generation directory has no name"))?;

        let tmp = self.root.join(format!("{}.tmp", CURRENT_FILE));
        write_synced(&tmp, format!("{}\n", name).as_bytes())?;

        let current = self.root.join(CURRENT_FILE);
        fs::rename(&tmp, &current).map_err(|e| RetrievalError::io(&current, e))?;
        sync_dir(&self.root);
        Ok(())
    }

    fn current_dir(&self) -> Result<PathBuf> {
        let current = self.root.join(CURRENT_FILE);
        let name = fs::read_to_string(&current).map_err(|e| {
            RetrievalError::corrupt(&current, format!("no committed snapshot: {}", e))
        })?;
        let name = name.trim();

        if !name.starts_with(SNAPSHOT_PREFIX) || name.contains(['/', '\\']) {
            return Err(RetrievalError::corrupt(
                &current,
                format!("invalid snapshot name {:?}", name),
            ));
        }

        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Err(RetrievalError::corrupt(&dir, "committed snapshot directory is missing"));
        }
        Ok(dir)
    }

    /// Committed generation number, if any
    pub fn current_generation(&self) -> Option<u64> {
        self.current_dir().ok().as_deref().and_then(parse_generation)
    }

    fn next_generation(&self) -> Result<u64> {
        let entries = fs::read_dir(&self.root).map_err(|e| RetrievalError::io(&self.root, e))?;
        let highest = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| parse_generation(&e.path()))
            .max()
            .unwrap_or(0);
        Ok(highest + 1)
    }

    /// Best-effort removal of older generations and abandoned staging dirs
    fn remove_superseded(&self, keep: u64) {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "could not list store root for cleanup");
                return;
            }
        };

        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            let stale = name.starts_with(STAGING_PREFIX)
                || parse_generation(&path).is_some_and(|g| g != keep);
            if !stale {
                continue;
            }
            if let Err(e) = fs::remove_dir_all(&path) {
                warn!(path = %path.display(), error = %e, "could not remove superseded snapshot");
            } else {
                debug!(path = %path.display(), "removed superseded snapshot");
            }
        }
    }
}

fn generation_dir_name(generation: u64) -> String {
    format!("{}{:020}", SNAPSHOT_PREFIX, generation)
}

fn parse_generation(path: &Path) -> Option<u64> {
    path.file_name()?
        .to_str()?
        .strip_prefix(SNAPSHOT_PREFIX)?
        .parse()
        .ok()
}

fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| RetrievalError::corrupt(path, format!("missing artifact: {}", e)))
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| RetrievalError::io(path, e))?;
    file.write_all(bytes).map_err(|e| RetrievalError::io(path, e))?;
    file.sync_all().map_err(|e| RetrievalError::io(path, e))?;
    Ok(())
}

/// Flush directory entries (renames) to disk
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        debug!(path = %dir.display(), error = %e, "directory sync failed");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
