//! Shared fixtures: a bag-of-words embedder and session builders.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use koi_chat::{AnswerMode, ChatConfig, Session};
use koi_model::MockLlm;
use koi_rag::{EmbeddingProvider, FileBlob, RagConfig, RagPipeline, Result, RetrievalStrategy};

const DIMS: usize = 256;

/// Deterministic embedder: one bucket per hashed lowercase token.
pub struct BagOfWords;

#[async_trait]
impl EmbeddingProvider for BagOfWords {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0; DIMS];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let hash = token
                .to_lowercase()
                .bytes()
                .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3));
            vector[(hash % DIMS as u64) as usize] += 1.0;
        }
        Ok(vector)
    }

    fn dimensions(&self) -> Option<usize> {
        Some(DIMS)
    }
}

pub fn pipeline(strategy: RetrievalStrategy) -> RagPipeline {
    let config = RagConfig::builder().top_k(2).retrieval(strategy).build().unwrap();
    RagPipeline::builder().config(config).embedding_provider(Arc::new(BagOfWords)).build().unwrap()
}

pub fn session_with(llm: &MockLlm, config: ChatConfig, strategy: RetrievalStrategy) -> Session {
    Session::builder()
        .config(config)
        .llm(Arc::new(llm.clone()))
        .pipeline(pipeline(strategy))
        .build()
        .unwrap()
}

pub fn session(llm: &MockLlm, mode: AnswerMode) -> Session {
    let config = ChatConfig::builder().mode(mode).build().unwrap();
    session_with(llm, config, RetrievalStrategy::default())
}

pub fn documents() -> Vec<FileBlob> {
    vec![
        FileBlob::new(
            "pricing.txt",
            "The zorblax subscription price is twelve euros per month.",
        ),
        FileBlob::new(
            "shipping.txt",
            "Orders ship within three working days from the warehouse.",
        ),
    ]
}
