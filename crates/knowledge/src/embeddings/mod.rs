//! Embedding providers.
//!
//! A provider is created once from [`recall_core::EmbeddingSettings`] and
//! shared by every knowledge base manager.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
pub use providers::{ollama::OllamaProvider, trigram::TrigramProvider};
