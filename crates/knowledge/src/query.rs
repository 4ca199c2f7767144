//! Similarity queries against a managed knowledge base.

use crate::error::{KnowledgeError, KnowledgeResult};
use crate::manager::KnowledgeBaseManager;
use crate::types::{EmbeddedDocument, KnowledgeBase};
use crate::vector_index::{SearchFilter, SearchHit};
use std::collections::HashMap;
use std::sync::Arc;

/// Knobs for a similarity query.
#[derive(Clone)]
pub struct QueryOptions {
    /// Maximum number of documents returned
    pub top_n: usize,
    /// Candidates fetched before `filter` is applied
    pub fetch_k: usize,
    /// Optional predicate over document text
    pub filter: Option<Arc<SearchFilter>>,
}

impl QueryOptions {
    pub fn new(top_n: usize) -> Self {
        Self {
            top_n,
            ..Default::default()
        }
    }

    pub fn with_fetch_k(mut self, fetch_k: usize) -> Self {
        self.fetch_k = fetch_k;
        self
    }

    pub fn with_filter(mut self, filter: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        let filter: Arc<SearchFilter> = Arc::new(filter);
        self.filter = Some(filter);
        self
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_n: 5,
            fetch_k: 20,
            filter: None,
        }
    }
}

impl std::fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOptions")
            .field("top_n", &self.top_n)
            .field("fetch_k", &self.fetch_k)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

/// Find the documents most similar to `query`, best first.
///
/// Asking for more documents than the knowledge base holds returns all of
/// them. Index failures (including an empty knowledge base) propagate as is.
pub fn query_similar(
    manager: &mut KnowledgeBaseManager,
    query: &EmbeddedDocument,
    options: &QueryOptions,
) -> KnowledgeResult<Vec<EmbeddedDocument>> {
    let scored = query_similar_scored(manager, query, options)?;
    Ok(scored.into_iter().map(|(document, _)| document).collect())
}

/// Like [`query_similar`], keeping each document's similarity score.
pub fn query_similar_scored(
    manager: &mut KnowledgeBaseManager,
    query: &EmbeddedDocument,
    options: &QueryOptions,
) -> KnowledgeResult<Vec<(EmbeddedDocument, f32)>> {
    let hits = {
        let index = manager.get_or_create_index()?;
        index.search(
            query.embedding(),
            options.top_n,
            options.fetch_k,
            options.filter.as_deref(),
        )?
    };

    tracing::debug!(
        "Query against '{}' returned {} hits",
        manager.knowledge_base().name(),
        hits.len()
    );

    resolve_hits(manager.knowledge_base(), hits)
}

/// Map raw hits back to stored documents by text, keeping index order.
///
/// Documents sharing a text are handed out one per hit.
fn resolve_hits(
    kb: &KnowledgeBase,
    hits: Vec<SearchHit>,
) -> KnowledgeResult<Vec<(EmbeddedDocument, f32)>> {
    let mut by_text: HashMap<&str, Vec<&EmbeddedDocument>> = HashMap::with_capacity(kb.len());
    for document in kb.documents() {
        by_text.entry(document.text()).or_default().push(document);
    }

    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        let document = by_text
            .get_mut(hit.text.as_str())
            .and_then(|candidates| candidates.pop());

        let Some(document) = document else {
            tracing::error!(
                "Search hit does not match any document in knowledge base {}: {:?}",
                kb.id(),
                hit.text
            );
            return Err(KnowledgeError::InternalConsistency(format!(
                "search hit not found in knowledge base {}",
                kb.id()
            )));
        };

        results.push((document.clone(), hit.score));
    }

    Ok(results)
}
