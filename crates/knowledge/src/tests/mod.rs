//! Scenario tests spanning the manager, cache and query layers.

mod concurrency;

use crate::error::KnowledgeResult;
use crate::flat_index::FlatIndexProvider;
use crate::vector_index::{IndexEntry, IndexProvider, VectorIndex};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Flat index provider that counts how many indexes it has built.
#[derive(Debug, Default)]
pub(crate) struct CountingIndexProvider {
    builds: AtomicUsize,
}

impl CountingIndexProvider {
    pub(crate) fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl IndexProvider for CountingIndexProvider {
    fn name(&self) -> &str {
        "counting-flat"
    }

    fn build(&self, entries: &[IndexEntry]) -> KnowledgeResult<Box<dyn VectorIndex>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        FlatIndexProvider.build(entries)
    }
}
