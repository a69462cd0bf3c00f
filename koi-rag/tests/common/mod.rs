//! Deterministic embedders for tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use koi_rag::{Document, DocumentFormat, EmbeddingProvider, RagError, Result};

pub const DIMS: usize = 512;

fn fnv1a(token: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in token.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// Bag-of-words vector: one bucket per hashed lowercase token.
pub fn hash_embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIMS];
    for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
        let bucket = (fnv1a(&token.to_lowercase()) % DIMS as u64) as usize;
        vector[bucket] += 1.0;
    }
    vector
}

/// Counts calls and optionally delays or fails.
#[derive(Default)]
pub struct HashingEmbedder {
    pub batch_calls: AtomicUsize,
    pub delay: Option<Duration>,
    pub fail: bool,
}

impl HashingEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(RagError::EmbeddingServiceError {
                provider: "hashing".to_string(),
                message: "quota exceeded".to_string(),
            });
        }
        Ok(hash_embed(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> Option<usize> {
        Some(DIMS)
    }
}

pub fn document(name: &str, text: &str) -> Document {
    Document {
        id: format!("doc-{name}"),
        origin: name.to_string(),
        format: DocumentFormat::PlainText,
        text: text.to_string(),
        metadata: HashMap::from([("source".to_string(), name.to_string())]),
    }
}

const FILLER: [&str; 6] = ["amber", "birch", "cedar", "dune", "ember", "fjord"];

/// Exactly `len` characters of space-separated filler words.
pub fn filler(len: usize) -> String {
    let mut text = String::new();
    let mut i = 0;
    while text.len() < len {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(FILLER[i % FILLER.len()]);
        i += 1;
    }
    text.truncate(len);
    text
}
