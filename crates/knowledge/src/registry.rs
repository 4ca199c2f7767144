//! In-memory registry of knowledge bases.
//!
//! This is the surface the boundary layer talks to. The registry map is
//! behind a read-write lock and each manager behind its own mutex, so
//! operations on one knowledge base are serialised while different
//! knowledge bases proceed independently. Embedding happens before a
//! manager lock is taken, so a slow embedding provider only delays its own
//! caller.

use crate::cache::CacheStats;
use crate::embeddings::EmbeddingProvider;
use crate::error::{KnowledgeError, KnowledgeResult};
use crate::manager::{embed_document, KnowledgeBaseManager};
use crate::query::{query_similar_scored, QueryOptions};
use crate::types::{
    DocumentId, KnowledgeBase, KnowledgeBaseId, KnowledgeBaseSummary, SimilarDocument,
};
use crate::vector_index::IndexProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

type SharedManager = Arc<Mutex<KnowledgeBaseManager>>;

pub struct KnowledgeRegistry {
    managers: RwLock<HashMap<KnowledgeBaseId, SharedManager>>,
    embedder: Arc<dyn EmbeddingProvider>,
    index_provider: Arc<dyn IndexProvider>,
    max_to_memorize: usize,
    fetch_k: usize,
}

impl KnowledgeRegistry {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index_provider: Arc<dyn IndexProvider>,
        max_to_memorize: usize,
    ) -> KnowledgeResult<Self> {
        if max_to_memorize == 0 {
            return Err(KnowledgeError::Config(
                "max_to_memorize must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            managers: RwLock::new(HashMap::new()),
            embedder,
            index_provider,
            max_to_memorize,
            fetch_k: QueryOptions::default().fetch_k,
        })
    }

    /// Candidates fetched before filtering on every query.
    pub fn with_fetch_k(mut self, fetch_k: usize) -> Self {
        self.fetch_k = fetch_k;
        self
    }

    /// Create an empty knowledge base and return its id.
    pub async fn create_knowledge_base(&self, name: &str) -> KnowledgeResult<KnowledgeBaseId> {
        let kb = KnowledgeBase::new(name);
        let id = kb.id();
        let manager = KnowledgeBaseManager::new(
            kb,
            Arc::clone(&self.embedder),
            Arc::clone(&self.index_provider),
            self.max_to_memorize,
        )?;

        self.managers
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(manager)));

        tracing::info!("Created knowledge base '{}' ({})", name, id);
        Ok(id)
    }

    async fn manager(&self, id: KnowledgeBaseId) -> KnowledgeResult<SharedManager> {
        self.managers
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(KnowledgeError::KnowledgeBaseNotFound(id))
    }

    /// Snapshot of a knowledge base.
    pub async fn knowledge_base(&self, id: KnowledgeBaseId) -> KnowledgeResult<KnowledgeBase> {
        let manager = self.manager(id).await?;
        let guard = manager.lock().await;
        Ok(guard.knowledge_base().clone())
    }

    /// Summaries of every knowledge base, ordered by name.
    pub async fn list(&self) -> Vec<KnowledgeBaseSummary> {
        let managers: Vec<SharedManager> = self.managers.read().await.values().cloned().collect();

        let mut summaries = Vec::with_capacity(managers.len());
        for manager in managers {
            let guard = manager.lock().await;
            let kb = guard.knowledge_base();
            summaries.push(KnowledgeBaseSummary {
                id: kb.id(),
                name: kb.name().to_string(),
                documents_count: kb.len(),
                cached_indexes: guard.cache().len(),
            });
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        summaries
    }

    /// Embed `text` and add it to a knowledge base.
    pub async fn add_document(
        &self,
        kb_id: KnowledgeBaseId,
        text: &str,
    ) -> KnowledgeResult<DocumentId> {
        let manager = self.manager(kb_id).await?;
        let document = embed_document(self.embedder.as_ref(), text, None).await?;
        let document = manager.lock().await.insert_document(document)?;

        tracing::info!("Added document {} to knowledge base {}", document.id(), kb_id);
        Ok(document.id())
    }

    /// Remove a document from a knowledge base.
    pub async fn remove_document(
        &self,
        kb_id: KnowledgeBaseId,
        document_id: DocumentId,
    ) -> KnowledgeResult<()> {
        let manager = self.manager(kb_id).await?;
        let mut guard = manager.lock().await;
        guard.remove_document_by_id(&document_id)?;

        tracing::info!("Removed document {} from knowledge base {}", document_id, kb_id);
        Ok(())
    }

    /// Find the `top_n` documents most similar to `text`.
    ///
    /// The query text is embedded but never stored.
    pub async fn query_similar(
        &self,
        kb_id: KnowledgeBaseId,
        text: &str,
        top_n: usize,
    ) -> KnowledgeResult<Vec<SimilarDocument>> {
        let options = QueryOptions::new(top_n).with_fetch_k(self.fetch_k);
        self.query_with_options(kb_id, text, &options).await
    }

    pub async fn query_with_options(
        &self,
        kb_id: KnowledgeBaseId,
        text: &str,
        options: &QueryOptions,
    ) -> KnowledgeResult<Vec<SimilarDocument>> {
        let manager = self.manager(kb_id).await?;
        let query = embed_document(self.embedder.as_ref(), text, None).await?;

        let results = {
            let mut guard = manager.lock().await;
            query_similar_scored(&mut guard, &query, options)?
        };

        Ok(results
            .into_iter()
            .map(|(document, score)| SimilarDocument {
                id: document.id(),
                text: document.text().to_string(),
                score,
            })
            .collect())
    }

    pub async fn cache_stats(&self, kb_id: KnowledgeBaseId) -> KnowledgeResult<CacheStats> {
        let manager = self.manager(kb_id).await?;
        let guard = manager.lock().await;
        Ok(guard.cache_stats())
    }

    /// Resolve a knowledge base by id string or by exact name.
    pub async fn resolve(&self, key: &str) -> Option<KnowledgeBaseId> {
        if let Ok(id) = key.parse::<KnowledgeBaseId>() {
            if self.managers.read().await.contains_key(&id) {
                return Some(id);
            }
        }

        self.list()
            .await
            .into_iter()
            .find(|summary| summary.name == key)
            .map(|summary| summary.id)
    }
}

impl std::fmt::Debug for KnowledgeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeRegistry")
            .field("embedder", &self.embedder.provider_name())
            .field("index_provider", &self.index_provider.name())
            .field("max_to_memorize", &self.max_to_memorize)
            .field("fetch_k", &self.fetch_k)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::TrigramProvider;
    use crate::flat_index::FlatIndexProvider;

    fn registry() -> KnowledgeRegistry {
        KnowledgeRegistry::new(
            Arc::new(TrigramProvider::new(128)),
            Arc::new(FlatIndexProvider),
            5,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        let registry = registry();
        let id = registry.create_knowledge_base("notes").await.unwrap();

        let kb = registry.knowledge_base(id).await.unwrap();
        assert_eq!(kb.name(), "notes");
        assert!(kb.is_empty());
        assert_eq!(registry.resolve("notes").await, Some(id));
        assert_eq!(registry.resolve(&id.to_string()).await, Some(id));
    }

    #[tokio::test]
    async fn test_unknown_knowledge_base() {
        let registry = registry();
        let missing = KnowledgeBaseId::new();

        let err = registry.add_document(missing, "text").await.unwrap_err();
        assert!(matches!(err, KnowledgeError::KnowledgeBaseNotFound(id) if id == missing));
        assert!(registry.resolve("nobody").await.is_none());
    }

    #[tokio::test]
    async fn test_query_empty_knowledge_base() {
        let registry = registry();
        let id = registry.create_knowledge_base("empty").await.unwrap();

        let err = registry.query_similar(id, "anything", 3).await.unwrap_err();
        assert!(matches!(err, KnowledgeError::IndexUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_add_query_remove() {
        let registry = registry();
        let id = registry.create_knowledge_base("langs").await.unwrap();

        let rust = registry
            .add_document(id, "rust ownership and borrowing")
            .await
            .unwrap();
        registry
            .add_document(id, "python dynamic typing")
            .await
            .unwrap();

        let results = registry.query_similar(id, "borrowing in rust", 5).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, rust);

        registry.remove_document(id, rust).await.unwrap();
        let err = registry.remove_document(id, rust).await.unwrap_err();
        assert!(matches!(err, KnowledgeError::DocumentNotFound { .. }));

        let results = registry.query_similar(id, "borrowing in rust", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_ne!(results[0].id, rust);
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let registry = registry();
        registry.create_knowledge_base("zulu").await.unwrap();
        registry.create_knowledge_base("alpha").await.unwrap();

        let names: Vec<String> = registry.list().await.into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha".to_string(), "zulu".to_string()]);
    }
}
