//! Concurrent use of the registry from many tasks.

use crate::embeddings::{EmbeddingProvider, TrigramProvider};
use crate::flat_index::FlatIndexProvider;
use crate::registry::KnowledgeRegistry;
use futures::future::join_all;
use recall_core::AppResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

/// Embedder that stalls on texts containing "slow" until a permit is released.
#[derive(Debug)]
struct GatedEmbedder {
    inner: TrigramProvider,
    entered: Notify,
    gate: Semaphore,
}

impl GatedEmbedder {
    fn new() -> Self {
        Self {
            inner: TrigramProvider::new(128),
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for GatedEmbedder {
    fn provider_name(&self) -> &str {
        "gated"
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.iter().any(|text| text.contains("slow")) {
            self.entered.notify_one();
            let _permit = self.gate.acquire().await.unwrap();
        }
        self.inner.embed_batch(texts).await
    }
}

fn shared_registry(max: usize) -> Arc<KnowledgeRegistry> {
    Arc::new(
        KnowledgeRegistry::new(
            Arc::new(TrigramProvider::new(128)),
            Arc::new(FlatIndexProvider),
            max,
        )
        .unwrap(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_additions_are_all_kept() {
    let registry = shared_registry(3);
    let kb = registry.create_knowledge_base("shared").await.unwrap();

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .add_document(kb, &format!("concurrent note {}", i))
                    .await
            })
        })
        .collect();

    for result in join_all(handles).await {
        result.unwrap().unwrap();
    }

    let snapshot = registry.knowledge_base(kb).await.unwrap();
    assert_eq!(snapshot.len(), 32);

    let results = registry.query_similar(kb, "concurrent note", 100).await.unwrap();
    assert_eq!(results.len(), 32);

    let stats = registry.cache_stats(kb).await.unwrap();
    assert!(stats.entries <= 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_queries_and_mutations_respect_bound() {
    let registry = shared_registry(2);
    let kb = registry.create_knowledge_base("busy").await.unwrap();
    registry.add_document(kb, "seed document").await.unwrap();

    let writers = (0..8).map(|i| {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            let id = registry
                .add_document(kb, &format!("transient {}", i))
                .await
                .unwrap();
            if i % 2 == 0 {
                registry.remove_document(kb, id).await.unwrap();
            }
        })
    });
    let readers = (0..8).map(|_| {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            let results = registry.query_similar(kb, "seed", 3).await.unwrap();
            assert!(!results.is_empty());
        })
    });

    let handles: Vec<_> = writers.chain(readers).collect();
    for result in join_all(handles).await {
        result.unwrap();
    }

    assert_eq!(registry.knowledge_base(kb).await.unwrap().len(), 5);
    assert!(registry.cache_stats(kb).await.unwrap().entries <= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_knowledge_bases_are_independent() {
    let registry = shared_registry(5);
    let left = registry.create_knowledge_base("left").await.unwrap();
    let right = registry.create_knowledge_base("right").await.unwrap();

    let tasks = [(left, "left side"), (right, "right side")].map(|(kb, prefix)| {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            for i in 0..5 {
                registry
                    .add_document(kb, &format!("{} {}", prefix, i))
                    .await
                    .unwrap();
            }
            registry.query_similar(kb, prefix, 10).await.unwrap()
        })
    });

    let outcomes = join_all(tasks).await;
    let left_results = outcomes[0].as_ref().unwrap();
    let right_results = outcomes[1].as_ref().unwrap();

    assert_eq!(left_results.len(), 5);
    assert_eq!(right_results.len(), 5);
    assert!(left_results.iter().all(|doc| doc.text.starts_with("left")));
    assert!(right_results.iter().all(|doc| doc.text.starts_with("right")));

    let summaries = registry.list().await;
    assert_eq!(summaries.len(), 2);
    assert!(summaries.iter().all(|summary| summary.documents_count == 5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_query_embedding_does_not_block_knowledge_base() {
    let embedder = Arc::new(GatedEmbedder::new());
    let registry = Arc::new(
        KnowledgeRegistry::new(embedder.clone(), Arc::new(FlatIndexProvider), 5).unwrap(),
    );
    let kb = registry.create_knowledge_base("gated").await.unwrap();
    registry.add_document(kb, "seed document").await.unwrap();

    let pending = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.query_similar(kb, "slow query", 5).await })
    };
    embedder.entered.notified().await;

    // The stalled query must not hold the knowledge base while it embeds
    let added = tokio::time::timeout(
        Duration::from_secs(5),
        registry.add_document(kb, "fast document"),
    )
    .await
    .expect("add_document blocked behind a pending embedding")
    .unwrap();
    let stats = tokio::time::timeout(Duration::from_secs(5), registry.cache_stats(kb))
        .await
        .expect("cache_stats blocked behind a pending embedding")
        .unwrap();
    assert_eq!(stats.entries, 0);

    embedder.gate.add_permits(1);
    let results = pending.await.unwrap().unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().any(|doc| doc.id == added));
}
