//! Property tests for the recursive chunker.

mod common;

use koi_rag::{Chunk, Chunker, RecursiveChunker};
use proptest::prelude::*;

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Drop each chunk's leading overlap and concatenate.
fn reassemble(chunks: &[Chunk], overlap: usize) -> String {
    let mut text = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let skip = if i == 0 { 0 } else { overlap };
        text.extend(chunk.text.chars().skip(skip));
    }
    text
}

/// Text built from words, spaces, newlines and blank lines, plus some
/// multi-byte characters, so every separator level is exercised.
fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            4 => "[a-zé]{1,12}",
            3 => Just(" ".to_string()),
            1 => Just("\n".to_string()),
            1 => Just("\n\n".to_string()),
            1 => "[a-z]{20,60}",
        ],
        0..200,
    )
    .prop_map(|pieces| pieces.concat())
}

fn arb_sizes() -> impl Strategy<Value = (usize, usize)> {
    (1usize..120).prop_flat_map(|size| (Just(size), 0..size))
}

/// **Chunk coverage, size bound and overlap**
/// *For any* text and `chunk_overlap < chunk_size`, removing the overlaps
/// reconstructs the text exactly, no chunk exceeds `chunk_size` characters,
/// and neighbours share exactly `chunk_overlap` characters.
mod prop_chunk_invariants {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn chunks_cover_bound_and_overlap(text in arb_text(), (size, overlap) in arb_sizes()) {
            let document = common::document("prop.txt", &text);
            let chunks = RecursiveChunker::new(size, overlap).chunk(&document);

            prop_assert_eq!(reassemble(&chunks, overlap), text.clone());
            prop_assert_eq!(chunks.is_empty(), text.is_empty());

            for chunk in &chunks {
                prop_assert!(char_len(&chunk.text) <= size);
                prop_assert!(!chunk.text.is_empty());
            }

            for pair in chunks.windows(2) {
                let previous: Vec<char> = pair[0].text.chars().collect();
                let next: Vec<char> = pair[1].text.chars().collect();
                prop_assert!(previous.len() > overlap);
                prop_assert_eq!(&previous[previous.len() - overlap..], &next[..overlap]);
                prop_assert_eq!(pair[1].offset, pair[0].offset + previous.len() - overlap);
            }
        }

        #[test]
        fn chunking_is_deterministic(text in arb_text(), (size, overlap) in arb_sizes()) {
            let document = common::document("prop.txt", &text);
            let chunker = RecursiveChunker::new(size, overlap);
            prop_assert_eq!(chunker.chunk(&document), chunker.chunk(&document));
        }
    }
}

#[test]
fn three_thousand_characters_make_four_chunks() {
    let text = common::filler(3000);
    let chunks = RecursiveChunker::new(1000, 200).chunk(&common::document("long.txt", &text));

    assert_eq!(chunks.len(), 4);
    assert!(chunks.iter().all(|c| char_len(&c.text) <= 1000));
    for pair in chunks.windows(2) {
        let tail: String = pair[0].text.chars().skip(char_len(&pair[0].text) - 200).collect();
        let head: String = pair[1].text.chars().take(200).collect();
        assert_eq!(tail, head);
    }
    assert_eq!(reassemble(&chunks, 200), text);
}

#[test]
fn chunks_inherit_metadata_and_ids() {
    let text = common::filler(250);
    let chunks = RecursiveChunker::new(100, 20).chunk(&common::document("meta.txt", &text));

    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.id, format!("doc-meta.txt_{i}"));
        assert_eq!(chunk.document_id, "doc-meta.txt");
        assert_eq!(chunk.metadata["source"], "meta.txt");
        assert_eq!(chunk.metadata["chunk_index"], i.to_string());
    }
}

#[test]
fn chunk_all_keeps_document_order() {
    let documents =
        vec![common::document("a.txt", "first document"), common::document("b.txt", "second one")];
    let chunks = RecursiveChunker::new(1000, 200).chunk_all(&documents);
    let sources: Vec<_> = chunks.iter().map(|c| c.metadata["source"].as_str()).collect();
    assert_eq!(sources, ["a.txt", "b.txt"]);
}
