//! Knowledge bases with memoized similarity indexes.
//!
//! Documents are embedded once on insertion. Search indexes are built lazily,
//! cached per knowledge-base state under a content fingerprint, carried
//! forward in place across additions, and bounded per knowledge base by an
//! LRU policy.

pub mod cache;
pub mod embeddings;
pub mod error;
pub mod fingerprint;
pub mod flat_index;
pub mod manager;
pub mod query;
pub mod registry;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use cache::{CacheStats, IndexCache};
pub use embeddings::{create_provider, EmbeddingProvider};
pub use error::{KnowledgeError, KnowledgeResult};
pub use fingerprint::{fingerprint, Fingerprint};
pub use flat_index::{FlatIndex, FlatIndexProvider};
pub use manager::{KnowledgeBaseManager, DEFAULT_MAX_TO_MEMORIZE};
pub use query::{query_similar, query_similar_scored, QueryOptions};
pub use registry::KnowledgeRegistry;
pub use types::{
    DocumentId, EmbeddedDocument, KnowledgeBase, KnowledgeBaseId, KnowledgeBaseSummary,
    SimilarDocument,
};
pub use vector_index::{IndexEntry, IndexId, IndexProvider, SearchFilter, SearchHit, VectorIndex};

use recall_core::{AppConfig, AppResult};
use std::sync::Arc;

/// Build a registry from application configuration.
///
/// The embedding provider is created once here and shared by every
/// knowledge base the registry creates.
pub async fn build_registry(config: &AppConfig) -> AppResult<KnowledgeRegistry> {
    config.validate()?;

    let embedder = create_provider(&config.embedding).await?;

    tracing::info!(
        "Using embedding provider '{}' (model: {}, {} dimensions), cache bound {}",
        embedder.provider_name(),
        embedder.model_name(),
        embedder.dimensions(),
        config.max_to_memorize
    );

    let registry = KnowledgeRegistry::new(
        embedder,
        Arc::new(FlatIndexProvider),
        config.max_to_memorize,
    )?
    .with_fetch_k(config.fetch_k);

    Ok(registry)
}
