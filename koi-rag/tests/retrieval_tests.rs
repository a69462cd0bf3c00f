//! End-to-end ingestion and retrieval with a deterministic embedder.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use common::HashingEmbedder;
use koi_rag::{
    DenseIndex, Document, EmbedOptions, EmbeddingProvider, KnowledgeBase, RagConfig, RagError,
    RagPipeline, RetrievalStrategy,
};

fn pipeline_with(config: RagConfig, embedder: HashingEmbedder) -> RagPipeline {
    RagPipeline::builder().config(config).embedding_provider(Arc::new(embedder)).build().unwrap()
}

/// 3000 characters with "zorblax" placed well inside the third chunk.
fn marked_document() -> Document {
    let text = format!("{} zorblax {}", common::filler(2100), common::filler(891));
    assert_eq!(text.chars().count(), 3000);
    common::document("handbook.txt", &text)
}

async fn knowledge_base(strategy: RetrievalStrategy) -> KnowledgeBase {
    let config = RagConfig::builder().retrieval(strategy).build().unwrap();
    pipeline_with(config, HashingEmbedder::new())
        .build_knowledge_base(&[marked_document()])
        .await
        .unwrap()
}

#[tokio::test]
async fn unique_term_retrieves_its_chunk_first() {
    let kb = knowledge_base(RetrievalStrategy::default()).await;
    assert_eq!(kb.chunk_count(), 4);

    let results = kb.retrieve("What is zorblax?").await.unwrap();
    assert_eq!(results[0].chunk.id, "doc-handbook.txt_2");
    assert!(results[0].chunk.text.contains("zorblax"));
    assert!(results.len() <= 5);
}

#[tokio::test]
async fn every_strategy_finds_the_marked_chunk() {
    for strategy in [
        RetrievalStrategy::DenseOnly,
        RetrievalStrategy::SparseOnly,
        RetrievalStrategy::Fused { dense_weight: 0.5, sparse_weight: 0.5 },
    ] {
        let kb = knowledge_base(strategy).await;
        let results = kb.retrieve("zorblax").await.unwrap();
        assert_eq!(results[0].chunk.id, "doc-handbook.txt_2", "strategy {strategy:?}");
    }
}

#[tokio::test]
async fn chunk_text_as_query_ranks_that_chunk_first() {
    let documents = [
        common::document("refunds.txt", "The refund policy allows returns within fourteen days"),
        common::document("shipping.txt", "Shipping is free for orders above fifty euros"),
        common::document("support.txt", "Support answers email on weekdays until six"),
    ];
    let config = RagConfig::builder().retrieval(RetrievalStrategy::DenseOnly).build().unwrap();
    let kb = pipeline_with(config, HashingEmbedder::new())
        .build_knowledge_base(&documents)
        .await
        .unwrap();

    for entry in kb.dense().entries() {
        let results = kb.retrieve_k(&entry.chunk.text, 1).await.unwrap();
        assert_eq!(results[0].chunk.id, entry.chunk.id);
    }
}

#[tokio::test]
async fn building_twice_yields_identical_indices() {
    let first = knowledge_base(RetrievalStrategy::default()).await;
    let second = knowledge_base(RetrievalStrategy::default()).await;
    assert_eq!(first.dense().entries(), second.dense().entries());
}

#[tokio::test]
async fn embeddings_are_requested_in_batches() {
    let embedder = Arc::new(HashingEmbedder::new());
    let chunks = RagPipeline::builder()
        .embedding_provider(embedder.clone())
        .build()
        .unwrap()
        .chunk(&[marked_document()]);

    let options = EmbedOptions { batch_size: 3, ..EmbedOptions::default() };
    DenseIndex::build(chunks, embedder.clone(), options).await.unwrap();
    assert_eq!(embedder.batch_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_batches_keep_chunk_order() {
    let embedder = Arc::new(HashingEmbedder::slow(Duration::from_millis(10)));
    let documents: Vec<Document> = (0..12)
        .map(|i| common::document(&format!("f{i}.txt"), &format!("topic{i} {}", common::filler(40))))
        .collect();
    let chunks = RagPipeline::builder()
        .embedding_provider(embedder.clone())
        .build()
        .unwrap()
        .chunk(&documents);

    let options = EmbedOptions { batch_size: 2, concurrency: 4, timeout: Duration::from_secs(5) };
    let index = DenseIndex::build(chunks.clone(), embedder, options).await.unwrap();

    for (entry, chunk) in index.entries().iter().zip(&chunks) {
        assert_eq!(&entry.chunk, chunk);
        assert_eq!(entry.vector, common::hash_embed(&chunk.text));
    }
}

#[tokio::test]
async fn embedding_failure_propagates() {
    let result = pipeline_with(RagConfig::default(), HashingEmbedder::failing())
        .build_knowledge_base(&[marked_document()])
        .await;
    assert!(matches!(result, Err(RagError::EmbeddingServiceError { .. })));
}

#[tokio::test(start_paused = true)]
async fn slow_embedding_times_out() {
    let config = RagConfig::builder().service_timeout_secs(1).build().unwrap();
    let result = pipeline_with(config, HashingEmbedder::slow(Duration::from_secs(30)))
        .build_knowledge_base(&[marked_document()])
        .await;
    match result {
        Err(RagError::RetrievalTimeoutError { operation, limit }) => {
            assert_eq!(operation, "embedding batch");
            assert_eq!(limit, Duration::from_secs(1));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn no_chunks_is_an_empty_index() {
    let result = pipeline_with(RagConfig::default(), HashingEmbedder::new())
        .build_knowledge_base(&[common::document("empty.txt", "")])
        .await;
    assert!(matches!(result, Err(RagError::EmptyIndexError)));
}

#[tokio::test]
async fn keyword_pool_limits_the_sparse_index() {
    let config = RagConfig::builder().keyword_pool(2, "zorblax").build().unwrap();
    let kb = pipeline_with(config, HashingEmbedder::new())
        .build_knowledge_base(&[marked_document()])
        .await
        .unwrap();
    assert_eq!(kb.chunk_count(), 4);
    assert_eq!(kb.keyword_chunk_count(), 2);
}

#[tokio::test]
async fn saved_index_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");

    let pipeline = pipeline_with(RagConfig::default(), HashingEmbedder::new());
    let original = pipeline.build_knowledge_base(&[marked_document()]).await.unwrap();
    original.save(&path).unwrap();

    let restored = pipeline.load_knowledge_base(&path).await.unwrap();
    assert_eq!(original.dense().entries(), restored.dense().entries());
    assert_eq!(restored.keyword_chunk_count(), 4);
    assert_eq!(restored.sources(), ["handbook.txt"]);

    let results = restored.retrieve("zorblax").await.unwrap();
    assert_eq!(results[0].chunk.id, "doc-handbook.txt_2");
}

/// Embeds like [`HashingEmbedder`] but reports whatever size it is given.
struct Reporting {
    inner: HashingEmbedder,
    dimensions: Option<usize>,
}

#[async_trait]
impl EmbeddingProvider for Reporting {
    async fn embed(&self, text: &str) -> koi_rag::Result<Vec<f32>> {
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }
}

fn reporting_pipeline(dimensions: Option<usize>) -> RagPipeline {
    let provider = Reporting { inner: HashingEmbedder::new(), dimensions };
    RagPipeline::builder()
        .config(RagConfig::default())
        .embedding_provider(Arc::new(provider))
        .build()
        .unwrap()
}

async fn saved_index(path: &std::path::Path) {
    pipeline_with(RagConfig::default(), HashingEmbedder::new())
        .build_knowledge_base(&[marked_document()])
        .await
        .unwrap()
        .save(path)
        .unwrap();
}

#[tokio::test]
async fn provider_without_a_known_size_accepts_a_consistent_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");
    saved_index(&path).await;

    let restored = reporting_pipeline(None).load_knowledge_base(&path).await.unwrap();
    assert_eq!(restored.chunk_count(), 4);
    let results = restored.retrieve("zorblax").await.unwrap();
    assert_eq!(results[0].chunk.id, "doc-handbook.txt_2");
}

#[tokio::test]
async fn provider_size_mismatch_is_a_persistence_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");
    saved_index(&path).await;

    let result = reporting_pipeline(Some(3072)).load_knowledge_base(&path).await;
    assert!(matches!(result, Err(RagError::PersistenceError(message)) if message.contains("3072")));
}

#[tokio::test]
async fn entries_must_match_the_declared_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");
    saved_index(&path).await;

    let mut snapshot: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    snapshot["entries"][1]["vector"].as_array_mut().unwrap().pop();
    std::fs::write(&path, serde_json::to_vec(&snapshot).unwrap()).unwrap();

    let result = reporting_pipeline(None).load_knowledge_base(&path).await;
    assert!(matches!(result, Err(RagError::PersistenceError(message)) if message.contains("entry 1")));
}

#[tokio::test]
async fn corrupt_index_file_is_a_persistence_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");
    std::fs::write(&path, "{not json").unwrap();

    let result = pipeline_with(RagConfig::default(), HashingEmbedder::new())
        .load_knowledge_base(&path)
        .await;
    assert!(matches!(result, Err(RagError::PersistenceError(_))));
}

#[test]
fn pipeline_requires_an_embedding_provider() {
    let result = RagPipeline::builder().build();
    assert!(matches!(result, Err(RagError::ConfigError(_))));
}
