//! BM25 keyword index via tantivy.
//!
//! The index lives in RAM and is rebuilt together with the dense index; it
//! only ever covers the chunk set it was built from.

use std::cmp::Ordering;
use std::fmt;

use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, STORED, Schema, TEXT, Value};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, doc};
use tracing::{debug, info};

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};

const WRITER_HEAP_BYTES: usize = 50_000_000;

fn index_error(e: impl fmt::Display) -> RagError {
    RagError::KeywordIndexError(e.to_string())
}

/// Lexical index scoring chunks with BM25.
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    content: Field,
    position: Field,
    chunks: Vec<Chunk>,
}

impl fmt::Debug for KeywordIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeywordIndex").field("chunks", &self.chunks.len()).finish()
    }
}

impl KeywordIndex {
    /// Tokenize and index `chunks`.
    pub fn build(chunks: Vec<Chunk>) -> Result<Self> {
        let mut schema_builder = Schema::builder();
        let position = schema_builder.add_u64_field("position", STORED);
        let content = schema_builder.add_text_field("content", TEXT);
        let index = Index::create_in_ram(schema_builder.build());

        // A single indexing thread keeps document ids in insertion order.
        let mut writer: IndexWriter =
            index.writer_with_num_threads(1, WRITER_HEAP_BYTES).map_err(index_error)?;
        for (i, chunk) in chunks.iter().enumerate() {
            writer
                .add_document(doc!(position => i as u64, content => chunk.text.clone()))
                .map_err(index_error)?;
        }
        writer.commit().map_err(index_error)?;

        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(index_error)?;

        info!(chunks = chunks.len(), "keyword index built");
        Ok(Self { index, reader, content, position, chunks })
    }

    /// Return up to `k` chunks sharing terms with `text`, best BM25 score first.
    ///
    /// Query syntax errors are tolerated; the parseable terms are still used.
    /// Chunks with no matching term are never returned.
    pub fn query(&self, text: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 || self.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let parser = QueryParser::for_index(&self.index, vec![self.content]);
        let (query, errors) = parser.parse_query_lenient(text);
        if !errors.is_empty() {
            debug!(errors = errors.len(), "ignored unparseable query fragments");
        }

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(k)).map_err(index_error)?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let stored: TantivyDocument = searcher.doc(address).map_err(index_error)?;
            let position = stored
                .get_first(self.position)
                .and_then(|value| value.as_u64())
                .ok_or_else(|| index_error("stored document lost its position"))?;
            hits.push((position as usize, score));
        }
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));

        Ok(hits
            .into_iter()
            .filter_map(|(position, score)| {
                self.chunks.get(position).map(|chunk| SearchResult { chunk: chunk.clone(), score })
            })
            .collect())
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
