//! Bounded memo of built indexes, keyed by content fingerprint.
//!
//! Eviction is least-recently-used. An entry counts as used when it is
//! inserted and when the manager hands it out on a cache hit; plain
//! lookups through [`IndexCache::get`] leave recency alone.

use crate::fingerprint::Fingerprint;
use crate::vector_index::VectorIndex;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

/// Counters describing how a cache has been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries currently memorized
    pub entries: usize,
    /// Maximum number of entries
    pub capacity: usize,
    /// Index requests served from the cache
    pub hits: u64,
    /// Index requests that found no entry
    pub misses: u64,
    /// Indexes built from scratch
    pub builds: u64,
    /// Indexes reused by appending a document in place
    pub incremental_updates: u64,
    /// Entries dropped to respect the bound
    pub evictions: u64,
}

/// LRU-ordered mapping from fingerprint to index.
///
/// The underlying map is unbounded; the bound is enforced by
/// [`IndexCache::evict_to_bound`], which `put` calls after every insert.
pub struct IndexCache {
    entries: LruCache<Fingerprint, Box<dyn VectorIndex>>,
    max_entries: NonZeroUsize,
    stats: CacheStats,
}

impl IndexCache {
    pub fn new(max_entries: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            max_entries,
            stats: CacheStats {
                capacity: max_entries.get(),
                ..Default::default()
            },
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_entries.get()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains(fingerprint)
    }

    /// Look up an index without touching recency.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&dyn VectorIndex> {
        self.entries.peek(fingerprint).map(|index| index.as_ref())
    }

    /// Mark an entry as most recently used.
    pub fn touch(&mut self, fingerprint: &Fingerprint) {
        self.entries.promote(fingerprint);
    }

    /// Insert or replace an entry, then trim to the bound.
    pub fn put(&mut self, fingerprint: Fingerprint, index: Box<dyn VectorIndex>) {
        if let Some(replaced) = self.entries.put(fingerprint, index) {
            tracing::debug!(
                "Replaced cached {} under fingerprint {}",
                replaced.id(),
                fingerprint.short()
            );
        }
        self.evict_to_bound();
    }

    /// Remove and return an entry, typically to update it under a new key.
    pub fn pop(&mut self, fingerprint: &Fingerprint) -> Option<Box<dyn VectorIndex>> {
        self.entries.pop(fingerprint)
    }

    /// Drop least-recently-used entries until the bound holds.
    ///
    /// Returns how many entries were evicted. Idempotent.
    pub fn evict_to_bound(&mut self) -> usize {
        let mut evicted = 0;
        while self.entries.len() > self.max_entries.get() {
            match self.entries.pop_lru() {
                Some((fingerprint, index)) => {
                    tracing::debug!(
                        "Evicted {} ({} vectors) under fingerprint {}",
                        index.id(),
                        index.len(),
                        fingerprint.short()
                    );
                    evicted += 1;
                }
                None => break,
            }
        }
        self.stats.evictions += evicted as u64;
        evicted
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            ..self.stats
        }
    }

    pub(crate) fn record_hit(&mut self) {
        self.stats.hits += 1;
    }

    pub(crate) fn record_miss(&mut self) {
        self.stats.misses += 1;
    }

    pub(crate) fn record_build(&mut self) {
        self.stats.builds += 1;
    }

    pub(crate) fn record_incremental_update(&mut self) {
        self.stats.incremental_updates += 1;
    }
}

impl std::fmt::Debug for IndexCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexCache")
            .field("entries", &self.entries.len())
            .field("max_entries", &self.max_entries)
            .field("stats", &self.stats)
            .finish()
    }
}
