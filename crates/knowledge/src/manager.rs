//! Knowledge base manager.
//!
//! Owns one knowledge base and the cache of indexes built for its past and
//! present states. Reusing an index looks like this:
//!
//! ```text
//! add_document            get_or_create_index
//!  fp_old = fingerprint    fp = fingerprint
//!  insert document         hit?  -> return cached index
//!  fp_new = fingerprint    miss? -> build from all documents, cache under fp
//!  pop cache[fp_old]
//!  index.add(document)
//!  cache[fp_new] = index
//! ```
//!
//! Removals cannot be applied to an index in place, so they leave the old
//! entry behind and the next index request rebuilds. A removed id whose old
//! state may still be cached cannot come back with different text: the
//! fingerprint would match an index holding the old text.
//!
//! Every mutating call trims the cache to its bound before and after it runs.
//! The manager itself is not synchronised: callers sharing one across tasks
//! wrap it in a mutex, which keeps the fingerprint-mutate-recache sequence
//! atomic.

use crate::cache::{CacheStats, IndexCache};
use crate::embeddings::EmbeddingProvider;
use crate::error::{KnowledgeError, KnowledgeResult};
use crate::fingerprint::Fingerprint;
use crate::types::{DocumentId, EmbeddedDocument, KnowledgeBase};
use crate::vector_index::{IndexEntry, IndexProvider, VectorIndex};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default bound on memorized indexes per knowledge base.
pub const DEFAULT_MAX_TO_MEMORIZE: usize = 5;

pub struct KnowledgeBaseManager {
    kb: KnowledgeBase,
    embedder: Arc<dyn EmbeddingProvider>,
    index_provider: Arc<dyn IndexProvider>,
    cache: IndexCache,
    /// Texts of removed documents, kept while some cached index may hold them
    retired: HashMap<DocumentId, String>,
}

impl KnowledgeBaseManager {
    /// Create a manager for `kb`.
    ///
    /// A knowledge base that already holds documents gets its first index
    /// built and cached right away.
    pub fn new(
        kb: KnowledgeBase,
        embedder: Arc<dyn EmbeddingProvider>,
        index_provider: Arc<dyn IndexProvider>,
        max_to_memorize: usize,
    ) -> KnowledgeResult<Self> {
        let max_entries = NonZeroUsize::new(max_to_memorize).ok_or_else(|| {
            KnowledgeError::Config("max_to_memorize must be at least 1".to_string())
        })?;

        let mut manager = Self {
            kb,
            embedder,
            index_provider,
            cache: IndexCache::new(max_entries),
            retired: HashMap::new(),
        };

        if !manager.kb.is_empty() {
            manager.get_or_create_index()?;
        }

        tracing::debug!(
            "Created manager for knowledge base '{}' ({}): {} documents, cache bound {}",
            manager.kb.name(),
            manager.kb.id(),
            manager.kb.len(),
            max_to_memorize
        );

        Ok(manager)
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn cache(&self) -> &IndexCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn max_to_memorize(&self) -> usize {
        self.cache.capacity()
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Embed `text` without touching the knowledge base.
    ///
    /// A fresh id is generated when none is supplied.
    pub async fn embed_document(
        &self,
        text: &str,
        id: Option<DocumentId>,
    ) -> KnowledgeResult<EmbeddedDocument> {
        embed_document(self.embedder.as_ref(), text, id).await
    }

    /// Embed `text` and add it to the knowledge base.
    pub async fn add_document(
        &mut self,
        text: &str,
        id: Option<DocumentId>,
    ) -> KnowledgeResult<EmbeddedDocument> {
        let document = self.embed_document(text, id).await?;
        self.insert_document(document)
    }

    /// Add an already embedded document.
    ///
    /// Re-adding a document with an id and text already present is a no-op
    /// that returns the stored document. Reusing an id with different text is
    /// rejected, both for present documents and for removed ones whose old
    /// state may still be cached.
    pub fn insert_document(
        &mut self,
        document: EmbeddedDocument,
    ) -> KnowledgeResult<EmbeddedDocument> {
        if let Some(existing) = self.kb.get(&document.id()) {
            if existing.text() == document.text() {
                return Ok(existing.clone());
            }
            return Err(KnowledgeError::DuplicateDocument {
                document_id: document.id(),
                knowledge_base_id: self.kb.id(),
            });
        }

        if let Some(previous) = self.retired.get(&document.id()) {
            if previous != document.text() {
                return Err(KnowledgeError::DuplicateDocument {
                    document_id: document.id(),
                    knowledge_base_id: self.kb.id(),
                });
            }
        }

        if let Some(expected) = self.kb.dimensions() {
            let actual = document.embedding().len();
            if actual != expected {
                return Err(KnowledgeError::DimensionMismatch { expected, actual });
            }
        }

        let inserted = document.clone();
        self.bounded(move |manager| {
            let old_fingerprint = manager.kb.fingerprint();
            let entry = IndexEntry::from(&document);
            manager.kb.insert(document);
            manager.carry_index_forward(old_fingerprint, entry);
        });

        Ok(inserted)
    }

    /// Move the index cached for the previous state onto the current one.
    fn carry_index_forward(&mut self, old_fingerprint: Fingerprint, entry: IndexEntry) {
        let new_fingerprint = self.kb.fingerprint();

        // This exact state was indexed before and is still memorized
        if self.cache.contains(&new_fingerprint) {
            self.cache.touch(&new_fingerprint);
            tracing::debug!(
                "State {} already cached, keeping index for {}",
                new_fingerprint.short(),
                old_fingerprint.short()
            );
            return;
        }

        let Some(mut index) = self.cache.pop(&old_fingerprint) else {
            tracing::debug!(
                "No cached index for {}, next query will build one",
                old_fingerprint.short()
            );
            return;
        };

        match index.add(std::slice::from_ref(&entry)) {
            Ok(()) => {
                tracing::debug!(
                    "Appended document to {} ({} -> {})",
                    index.id(),
                    old_fingerprint.short(),
                    new_fingerprint.short()
                );
                self.cache.record_incremental_update();
                self.cache.put(new_fingerprint, index);
            }
            Err(e) => {
                tracing::warn!("Dropping {} after failed in-place add: {}", index.id(), e);
            }
        }
    }

    /// Remove a document from the knowledge base.
    pub fn remove_document(&mut self, document: &EmbeddedDocument) -> KnowledgeResult<()> {
        self.remove_document_by_id(&document.id()).map(|_| ())
    }

    /// Remove a document by id, returning it.
    ///
    /// The index cached for the previous state stays in the cache until the
    /// bound evicts it; it still answers for that state if it comes back.
    pub fn remove_document_by_id(&mut self, id: &DocumentId) -> KnowledgeResult<EmbeddedDocument> {
        if !self.kb.contains(id) {
            return Err(KnowledgeError::DocumentNotFound {
                document_id: *id,
                knowledge_base_id: self.kb.id(),
            });
        }

        let removed = self.bounded(|manager| manager.kb.remove(id));

        let removed = removed.ok_or_else(|| {
            KnowledgeError::InternalConsistency(format!(
                "document {} vanished during removal",
                id
            ))
        })?;

        if !self.cache.is_empty() {
            self.retired.insert(*id, removed.text().to_string());
        }
        Ok(removed)
    }

    /// Return the index for the current state, building it on a cache miss.
    ///
    /// Fails with [`KnowledgeError::IndexUnavailable`] when there are no
    /// documents to index.
    pub fn get_or_create_index(&mut self) -> KnowledgeResult<&dyn VectorIndex> {
        self.cache.evict_to_bound();

        let fingerprint = self.kb.fingerprint();
        if self.cache.contains(&fingerprint) {
            self.cache.touch(&fingerprint);
            self.cache.record_hit();
            tracing::debug!("Index cache hit for {}", fingerprint.short());
        } else {
            self.cache.record_miss();

            if self.kb.is_empty() {
                return Err(KnowledgeError::IndexUnavailable {
                    knowledge_base_id: self.kb.id(),
                });
            }

            let entries: Vec<IndexEntry> = self.kb.documents().map(IndexEntry::from).collect();
            let index = self.index_provider.build(&entries)?;
            self.cache.record_build();

            tracing::debug!(
                "Built {} over {} documents for {} using '{}'",
                index.id(),
                entries.len(),
                fingerprint.short(),
                self.index_provider.name()
            );

            self.cache.put(fingerprint, index);
        }

        self.cache.evict_to_bound();

        self.cache.get(&fingerprint).ok_or_else(|| {
            KnowledgeError::InternalConsistency(format!(
                "index for {} missing right after caching it",
                fingerprint.short()
            ))
        })
    }

    /// Run a mutation with the cache trimmed to its bound on both sides.
    fn bounded<T>(&mut self, mutation: impl FnOnce(&mut Self) -> T) -> T {
        self.cache.evict_to_bound();
        let result = mutation(self);
        self.cache.evict_to_bound();

        // No cached index left that could still hold a retired text
        if self.cache.is_empty() {
            self.retired.clear();
        }
        result
    }
}

/// Embed `text` with `embedder`, checking the vector length it reports.
///
/// Needs no manager, so callers can embed before taking a manager lock.
pub async fn embed_document(
    embedder: &dyn EmbeddingProvider,
    text: &str,
    id: Option<DocumentId>,
) -> KnowledgeResult<EmbeddedDocument> {
    let embedding = embedder.embed(text).await?;

    let expected = embedder.dimensions();
    if embedding.len() != expected {
        return Err(KnowledgeError::DimensionMismatch {
            expected,
            actual: embedding.len(),
        });
    }

    Ok(EmbeddedDocument::new(id.unwrap_or_default(), text, embedding))
}

impl std::fmt::Debug for KnowledgeBaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBaseManager")
            .field("knowledge_base", &self.kb.id())
            .field("documents", &self.kb.len())
            .field("embedder", &self.embedder.provider_name())
            .field("index_provider", &self.index_provider.name())
            .field("cache", &self.cache)
            .field("retired", &self.retired.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::TrigramProvider;
    use crate::flat_index::FlatIndexProvider;

    fn manager(max: usize) -> KnowledgeBaseManager {
        KnowledgeBaseManager::new(
            KnowledgeBase::new("Some knowledge"),
            Arc::new(TrigramProvider::new(64)),
            Arc::new(FlatIndexProvider),
            max,
        )
        .unwrap()
    }

    #[test]
    fn test_zero_bound_rejected() {
        let result = KnowledgeBaseManager::new(
            KnowledgeBase::new("kb"),
            Arc::new(TrigramProvider::new(8)),
            Arc::new(FlatIndexProvider),
            0,
        );
        assert!(matches!(result, Err(KnowledgeError::Config(_))));
    }

    #[test]
    fn test_new_with_documents_builds_index() {
        let mut kb = KnowledgeBase::new("kb");
        kb.insert(EmbeddedDocument::new(DocumentId::new(), "a", vec![1.0, 0.0]));

        let manager = KnowledgeBaseManager::new(
            kb,
            Arc::new(TrigramProvider::new(2)),
            Arc::new(FlatIndexProvider),
            5,
        )
        .unwrap();
        assert_eq!(manager.cache().len(), 1);
        assert_eq!(manager.cache_stats().builds, 1);
    }

    #[tokio::test]
    async fn test_empty_knowledge_base_has_no_index() {
        let mut manager = manager(5);
        let err = manager.get_or_create_index().unwrap_err();
        assert!(matches!(err, KnowledgeError::IndexUnavailable { .. }));
        assert!(manager.cache().is_empty());
    }

    #[tokio::test]
    async fn test_embed_document_does_not_mutate() {
        let manager = manager(5);
        let id = DocumentId::new();
        let doc = manager.embed_document("query text", Some(id)).await.unwrap();
        assert_eq!(doc.id(), id);
        assert_eq!(doc.embedding().len(), 64);
        assert!(manager.knowledge_base().is_empty());
    }

    #[tokio::test]
    async fn test_add_reuses_existing_index() {
        let mut manager = manager(5);
        manager.add_document("first document", None).await.unwrap();
        let id_before = manager.get_or_create_index().unwrap().id();

        manager.add_document("second document", None).await.unwrap();
        let index = manager.get_or_create_index().unwrap();
        assert_eq!(index.id(), id_before);
        assert_eq!(index.len(), 2);

        let stats = manager.cache_stats();
        assert_eq!(stats.builds, 1);
        assert_eq!(stats.incremental_updates, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_duplicate_id_handling() {
        let mut manager = manager(5);
        let doc = manager.add_document("original", None).await.unwrap();

        let again = manager.add_document("original", Some(doc.id())).await.unwrap();
        assert_eq!(again, doc);
        assert_eq!(manager.knowledge_base().len(), 1);

        let err = manager
            .add_document("different", Some(doc.id()))
            .await
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::DuplicateDocument { .. }));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected_before_mutation() {
        let mut manager = manager(5);
        manager.add_document("fits", None).await.unwrap();

        let wrong = EmbeddedDocument::new(DocumentId::new(), "too short", vec![1.0]);
        let err = manager.insert_document(wrong).unwrap_err();
        assert!(matches!(
            err,
            KnowledgeError::DimensionMismatch {
                expected: 64,
                actual: 1
            }
        ));
        assert_eq!(manager.knowledge_base().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_returns_document() {
        let mut manager = manager(5);
        let doc = manager.add_document("to be removed", None).await.unwrap();
        let removed = manager.remove_document_by_id(&doc.id()).unwrap();
        assert_eq!(removed, doc);
        assert!(manager.knowledge_base().is_empty());
    }
}
