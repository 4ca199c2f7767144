//! Knowledge base type definitions.

use crate::fingerprint::{fingerprint, Fingerprint};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque identifier of an embedded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Opaque identifier of a knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnowledgeBaseId(Uuid);

impl KnowledgeBaseId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for KnowledgeBaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for KnowledgeBaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for KnowledgeBaseId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A document together with its embedding.
///
/// Fields are private and there are no setters: once built, a document
/// never changes. This is what lets membership alone identify the content
/// of a knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedDocument {
    id: DocumentId,
    text: String,
    embedding: Vec<f32>,
}

impl EmbeddedDocument {
    pub fn new(id: DocumentId, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id,
            text: text.into(),
            embedding,
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }
}

/// A named, mutable collection of embedded documents.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeBase {
    id: KnowledgeBaseId,
    name: String,
    documents: HashMap<DocumentId, EmbeddedDocument>,
}

impl KnowledgeBase {
    /// Create an empty knowledge base with a fresh identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(KnowledgeBaseId::new(), name)
    }

    pub fn with_id(id: KnowledgeBaseId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            documents: HashMap::new(),
        }
    }

    pub fn id(&self) -> KnowledgeBaseId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.documents.contains_key(id)
    }

    pub fn get(&self, id: &DocumentId) -> Option<&EmbeddedDocument> {
        self.documents.get(id)
    }

    /// Documents in unspecified order.
    pub fn documents(&self) -> impl Iterator<Item = &EmbeddedDocument> {
        self.documents.values()
    }

    pub fn document_ids(&self) -> impl Iterator<Item = &DocumentId> {
        self.documents.keys()
    }

    /// Embedding length shared by the stored documents, if any are stored.
    pub fn dimensions(&self) -> Option<usize> {
        self.documents.values().next().map(|d| d.embedding().len())
    }

    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(self)
    }

    /// Insert a document, returning the one previously stored under its id.
    pub fn insert(&mut self, document: EmbeddedDocument) -> Option<EmbeddedDocument> {
        self.documents.insert(document.id(), document)
    }

    pub fn remove(&mut self, id: &DocumentId) -> Option<EmbeddedDocument> {
        self.documents.remove(id)
    }
}

/// Short description of a knowledge base, used for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseSummary {
    pub id: KnowledgeBaseId,
    pub name: String,
    pub documents_count: usize,
    pub cached_indexes: usize,
}

/// A query result as handed to the boundary layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarDocument {
    pub id: DocumentId,
    pub text: String,
    pub score: f32,
}
