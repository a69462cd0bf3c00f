//! Document chunking.
//!
//! [`RecursiveChunker`] cuts text into pieces of at most `chunk_size`
//! characters. Each cut is placed after the highest-priority separator found
//! in the allowed window; when no separator occurs there it falls back to a
//! hard cut at `chunk_size`. The next chunk starts `chunk_overlap` characters
//! before the previous one ended, so neighbouring chunks share exactly that
//! many characters and dropping the shared prefixes reassembles the document.

use crate::config::{DEFAULT_SEPARATORS, RagConfig};
use crate::document::{Chunk, Document};

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;

    /// Chunk every document, preserving document order.
    fn chunk_all(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|d| self.chunk(d)).collect()
    }
}

/// Splits on a priority-ordered separator list with an exact character overlap.
///
/// Sizes are measured in `char`s, never bytes, so multi-byte text is never
/// cut inside a code point. Chunk IDs are `{document_id}_{chunk_index}`.
///
/// ```rust,ignore
/// use koi_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(1000, 200);
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<Vec<char>>,
}

impl RecursiveChunker {
    /// Create a chunker with the default separators (blank line, newline, space).
    ///
    /// `chunk_size` is raised to at least 1 and `chunk_overlap` is capped
    /// below `chunk_size`; use [`RagConfig`] validation to reject such inputs.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.chars().collect()).collect(),
        }
    }

    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
            .with_separators(config.separators.iter().map(String::as_str))
    }

    /// Replace the separator list. Empty separators are ignored.
    pub fn with_separators<'a>(mut self, separators: impl IntoIterator<Item = &'a str>) -> Self {
        self.separators = separators
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.chars().collect())
            .collect();
        self
    }

    /// Character spans `(start, end)` of each chunk.
    fn spans(&self, chars: &[char]) -> Vec<(usize, usize)> {
        let len = chars.len();
        let mut spans = Vec::new();
        if len == 0 {
            return spans;
        }

        let mut start = 0;
        loop {
            if len - start <= self.chunk_size {
                spans.push((start, len));
                return spans;
            }
            // The cut must leave more than `chunk_overlap` characters behind so
            // the next start moves forward.
            let end = self.cut_point(chars, start + self.chunk_overlap + 1, start + self.chunk_size);
            spans.push((start, end));
            start = end - self.chunk_overlap;
        }
    }

    /// The latest position in `lo..=hi` that directly follows the
    /// highest-priority separator present, or `hi` for a hard cut.
    fn cut_point(&self, chars: &[char], lo: usize, hi: usize) -> usize {
        for separator in &self.separators {
            let width = separator.len();
            let mut cut = hi;
            while cut >= lo && cut >= width {
                if chars[cut - width..cut] == separator[..] {
                    return cut;
                }
                cut -= 1;
            }
        }
        hi
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let chars: Vec<char> = document.text.chars().collect();
        self.spans(&chars)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, (start, end))| {
                let mut metadata = document.metadata.clone();
                metadata.insert("chunk_index".to_string(), chunk_index.to_string());
                Chunk {
                    id: format!("{}_{chunk_index}", document.id),
                    text: chars[start..end].iter().collect(),
                    document_id: document.id.clone(),
                    offset: start,
                    metadata,
                }
            })
            .collect()
    }
}
