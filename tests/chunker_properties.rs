//! Chunking properties over arbitrary text

use quickcheck_macros::quickcheck;
use ragstation::corpus::chunk_text;

fn bounded(max_words: u8) -> usize {
    (max_words % 16) as usize + 1
}

#[quickcheck]
fn prop_blocks_respect_word_budget(content: String, max_words: u8) -> bool {
    let max_words = bounded(max_words);
    chunk_text(&content, "doc.txt", max_words)
        .iter()
        .all(|b| b.word_count() >= 1 && b.word_count() <= max_words)
}

#[quickcheck]
fn prop_rejoin_is_lossless(content: String, max_words: u8) -> bool {
    let blocks = chunk_text(&content, "doc.txt", bounded(max_words));
    let rejoined: Vec<&str> = blocks
        .iter()
        .flat_map(|b| b.text.split_whitespace())
        .collect();
    let original: Vec<&str> = content.split_whitespace().collect();
    rejoined == original
}

#[quickcheck]
fn prop_ordinals_count_from_zero(content: String) -> bool {
    chunk_text(&content, "doc.txt", 3)
        .iter()
        .enumerate()
        .all(|(i, b)| b.ordinal as usize == i)
}

#[quickcheck]
fn prop_chunking_is_deterministic(content: String, max_words: u8) -> bool {
    let max_words = bounded(max_words);
    chunk_text(&content, "doc.txt", max_words) == chunk_text(&content, "doc.txt", max_words)
}

#[test]
fn test_crlf_and_whitespace_lines_split_paragraphs() {
    let blocks = chunk_text("one two\r\n \t \r\nthree", "doc.txt", 10);
    let texts: Vec<&str> = blocks.iter().map(|b| b.text.as_str()).collect();
    assert_eq!(texts, vec!["one two", "three"]);
}
