//! Snapshot atomicity as seen from outside the store

use ragstation::corpus::Block;
use ragstation::{IndexStore, RetrievalError, VectorIndex};
use std::fs;
use tempfile::TempDir;

fn blocks(texts: &[&str]) -> Vec<Block> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| Block {
            text: t.to_string(),
            source_path: "doc.txt".to_string(),
            ordinal: i as u32,
        })
        .collect()
}

fn index(n: usize) -> VectorIndex {
    VectorIndex::build(
        (0..n)
            .map(|i| {
                let mut v = vec![0.0; n];
                v[i] = 1.0;
                v
            })
            .collect(),
    )
    .unwrap()
}

#[test]
fn test_leftover_staging_and_uncommitted_generation_are_invisible() {
    let temp = TempDir::new().unwrap();
    let store = IndexStore::new(temp.path());
    let committed = store.save(&index(2), &blocks(&["one", "two"])).unwrap();

    // A crashed writer: half a staging dir and a renamed but uncommitted generation
    let staging = temp.path().join(".staging-crashed");
    fs::create_dir(&staging).unwrap();
    fs::write(staging.join("vectors.bin"), b"RSVX").unwrap();
    let orphan = temp
        .path()
        .join(format!("snapshot-{:020}", committed.generation + 1));
    fs::create_dir(&orphan).unwrap();
    fs::write(orphan.join("vectors.bin"), b"RSVX").unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded.generation, committed.generation);
    assert_eq!(loaded.len(), 2);

    // Next save skips past the orphan and cleans both up
    let next = store.save(&index(3), &blocks(&["a", "b", "c"])).unwrap();
    assert!(next.generation > committed.generation + 1);
    assert!(!staging.exists());
    assert!(!orphan.exists());
    assert_eq!(store.load().unwrap().len(), 3);
}

#[test]
fn test_no_snapshot_is_corrupt() {
    let temp = TempDir::new().unwrap();
    let store = IndexStore::new(temp.path().join("never-built"));
    assert!(!store.has_snapshot());
    assert!(matches!(
        store.load(),
        Err(RetrievalError::CorruptSnapshot { .. })
    ));
}

#[test]
fn test_truncated_vectors_are_corrupt() {
    let temp = TempDir::new().unwrap();
    let store = IndexStore::new(temp.path());
    let handle = store.save(&index(2), &blocks(&["one", "two"])).unwrap();

    let vectors = handle.path.join("vectors.bin");
    let bytes = fs::read(&vectors).unwrap();
    fs::write(&vectors, &bytes[..bytes.len() - 3]).unwrap();

    match store.load() {
        Err(RetrievalError::CorruptSnapshot { path, .. }) => assert_eq!(path, vectors),
        other => panic!("expected CorruptSnapshot, got {:?}", other.map(|s| s.len())),
    }
}

#[test]
fn test_block_table_edited_to_wrong_count_is_corrupt() {
    let temp = TempDir::new().unwrap();
    let store = IndexStore::new(temp.path());
    let handle = store.save(&index(2), &blocks(&["one", "two"])).unwrap();

    fs::write(
        handle.path.join("blocks.json"),
        r#"{"format":"ragstation.blocks","version":1,"count":1,"records":["one"]}"#,
    )
    .unwrap();

    assert!(matches!(
        store.load(),
        Err(RetrievalError::CorruptSnapshot { .. })
    ));
}
