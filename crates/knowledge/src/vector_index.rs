//! Vector index abstraction.
//!
//! The manager only needs three things from an index backend: build one from
//! (text, vector) pairs, append more pairs in place, and search by vector.

use crate::error::KnowledgeResult;
use crate::types::EmbeddedDocument;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_INDEX_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a built index object.
///
/// An index keeps its id across in-place additions, so two lookups that
/// return the same id returned the same object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexId(u64);

impl IndexId {
    pub fn next() -> Self {
        Self(NEXT_INDEX_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "index-{}", self.0)
    }
}

/// A (text, vector) pair stored in an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub text: String,
    pub embedding: Vec<f32>,
}

impl From<&EmbeddedDocument> for IndexEntry {
    fn from(document: &EmbeddedDocument) -> Self {
        Self {
            text: document.text().to_string(),
            embedding: document.embedding().to_vec(),
        }
    }
}

/// A raw search result: stored text and its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub text: String,
    pub score: f32,
}

/// Predicate over stored text applied to fetched candidates.
pub type SearchFilter = dyn Fn(&str) -> bool + Send + Sync;

/// Trait for vector index backends.
pub trait VectorIndex: Send + Sync + fmt::Debug {
    fn id(&self) -> IndexId;

    fn dimensions(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append entries in place.
    fn add(&mut self, entries: &[IndexEntry]) -> KnowledgeResult<()>;

    /// Search for the `k` entries most similar to `query`, best first.
    ///
    /// With a filter, the `fetch_k` nearest candidates are fetched first and
    /// the filter narrows them down before truncating to `k`.
    fn search(
        &self,
        query: &[f32],
        k: usize,
        fetch_k: usize,
        filter: Option<&SearchFilter>,
    ) -> KnowledgeResult<Vec<SearchHit>>;
}

/// Builds fresh indexes from a full set of entries.
pub trait IndexProvider: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn build(&self, entries: &[IndexEntry]) -> KnowledgeResult<Box<dyn VectorIndex>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentId;

    #[test]
    fn test_index_ids_are_unique() {
        let a = IndexId::next();
        let b = IndexId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("index-"));
    }

    #[test]
    fn test_entry_from_document() {
        let doc = EmbeddedDocument::new(DocumentId::new(), "text", vec![0.1, 0.2]);
        let entry = IndexEntry::from(&doc);
        assert_eq!(entry.text, "text");
        assert_eq!(entry.embedding, vec![0.1, 0.2]);
    }
}
