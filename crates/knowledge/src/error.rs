//! Knowledge error types.

use crate::types::{DocumentId, KnowledgeBaseId};
use recall_core::AppError;
use thiserror::Error;

/// Errors raised by knowledge base, cache and index operations.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    /// Removal requested for a document the knowledge base does not hold
    #[error("Document {document_id} does not exist in knowledge base {knowledge_base_id}")]
    DocumentNotFound {
        document_id: DocumentId,
        knowledge_base_id: KnowledgeBaseId,
    },

    /// An explicit id was reused for a document with different text
    #[error("Document {document_id} was already used in knowledge base {knowledge_base_id} with different text")]
    DuplicateDocument {
        document_id: DocumentId,
        knowledge_base_id: KnowledgeBaseId,
    },

    /// Index requested for a knowledge base with no documents
    #[error("Cannot build an index for knowledge base {knowledge_base_id}: it has no documents")]
    IndexUnavailable { knowledge_base_id: KnowledgeBaseId },

    /// Lookup of a knowledge base id unknown to the registry
    #[error("Knowledge base {0} not found")]
    KnowledgeBaseNotFound(KnowledgeBaseId),

    /// Vector length differs from the one the index or knowledge base holds
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Search results that cannot be mapped back to stored documents
    #[error("Internal consistency violation: {0}")]
    InternalConsistency(String),

    /// Index backend failure
    #[error("Index error: {0}")]
    Index(String),

    /// Invalid manager or registry settings
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    App(#[from] AppError),
}

impl KnowledgeError {
    /// Whether the caller can fix the condition (as opposed to a bug or backend failure).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            KnowledgeError::DocumentNotFound { .. }
                | KnowledgeError::DuplicateDocument { .. }
                | KnowledgeError::IndexUnavailable { .. }
                | KnowledgeError::KnowledgeBaseNotFound(_)
                | KnowledgeError::DimensionMismatch { .. }
        )
    }
}

impl From<KnowledgeError> for AppError {
    fn from(err: KnowledgeError) -> Self {
        match err {
            KnowledgeError::App(inner) => inner,
            KnowledgeError::Config(msg) => AppError::Config(msg),
            other => AppError::Knowledge(other.to_string()),
        }
    }
}

/// Convenience type alias for knowledge operations.
pub type KnowledgeResult<T> = Result<T, KnowledgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        let err = KnowledgeError::IndexUnavailable {
            knowledge_base_id: KnowledgeBaseId::new(),
        };
        assert!(err.is_client_error());
        assert!(!KnowledgeError::InternalConsistency("boom".to_string()).is_client_error());
    }

    #[test]
    fn test_into_app_error() {
        let app: AppError = KnowledgeError::App(AppError::Embedding("down".to_string())).into();
        assert!(matches!(app, AppError::Embedding(_)));

        let kb = KnowledgeBaseId::new();
        let app: AppError = KnowledgeError::KnowledgeBaseNotFound(kb).into();
        assert!(app.to_string().contains(&kb.to_string()));
    }
}
