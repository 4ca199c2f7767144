//! Exact in-memory vector index.
//!
//! Scores every stored entry by cosine similarity. Adequate for the document
//! counts a single knowledge base holds, and the reference backend for tests.

use crate::error::{KnowledgeError, KnowledgeResult};
use crate::vector_index::{
    IndexEntry, IndexId, IndexProvider, SearchFilter, SearchHit, VectorIndex,
};
use std::cmp::Ordering;

/// Brute-force cosine index.
#[derive(Debug)]
pub struct FlatIndex {
    id: IndexId,
    dimensions: usize,
    entries: Vec<IndexEntry>,
}

impl FlatIndex {
    /// Build an index from a non-empty set of entries of equal length.
    pub fn from_entries(entries: &[IndexEntry]) -> KnowledgeResult<Self> {
        let first = entries.first().ok_or_else(|| {
            KnowledgeError::Index("cannot build an index from zero entries".to_string())
        })?;

        let mut index = Self {
            id: IndexId::next(),
            dimensions: first.embedding.len(),
            entries: Vec::with_capacity(entries.len()),
        };
        index.add(entries)?;
        Ok(index)
    }

    fn check_dimensions(&self, actual: usize) -> KnowledgeResult<()> {
        if actual != self.dimensions {
            return Err(KnowledgeError::DimensionMismatch {
                expected: self.dimensions,
                actual,
            });
        }
        Ok(())
    }
}

impl VectorIndex for FlatIndex {
    fn id(&self) -> IndexId {
        self.id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn add(&mut self, entries: &[IndexEntry]) -> KnowledgeResult<()> {
        // Validate the whole batch first so a bad entry leaves the index untouched
        for entry in entries {
            self.check_dimensions(entry.embedding.len())?;
        }
        self.entries.extend_from_slice(entries);
        Ok(())
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        fetch_k: usize,
        filter: Option<&SearchFilter>,
    ) -> KnowledgeResult<Vec<SearchHit>> {
        self.check_dimensions(query.len())?;

        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(query, &entry.embedding)))
            .collect();

        // Stable sort: ties keep insertion order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let hits = scored.into_iter().map(|(i, score)| SearchHit {
            text: self.entries[i].text.clone(),
            score,
        });

        let results = match filter {
            Some(filter) => hits
                .take(fetch_k)
                .filter(|hit| filter(hit.text.as_str()))
                .take(k)
                .collect(),
            None => hits.take(k).collect(),
        };

        Ok(results)
    }
}

/// Provider producing [`FlatIndex`] instances.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatIndexProvider;

impl IndexProvider for FlatIndexProvider {
    fn name(&self) -> &str {
        "flat"
    }

    fn build(&self, entries: &[IndexEntry]) -> KnowledgeResult<Box<dyn VectorIndex>> {
        tracing::debug!("Building flat index over {} entries", entries.len());
        Ok(Box::new(FlatIndex::from_entries(entries)?))
    }
}

/// Calculate cosine similarity between two vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            text: text.to_string(),
            embedding,
        }
    }

    fn sample_index() -> FlatIndex {
        FlatIndex::from_entries(&[
            entry("east", vec![1.0, 0.0]),
            entry("north", vec![0.0, 1.0]),
            entry("north-east", vec![0.7, 0.7]),
        ])
        .unwrap()
    }

    #[test]
    fn test_search_ranks_by_similarity() {
        let index = sample_index();
        let hits = index.search(&[0.9, 0.1], 3, 20, None).unwrap();

        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["east", "north-east", "north"]);
        assert!(hits[0].score > hits[1].score);
        assert!(hits[1].score > hits[2].score);
    }

    #[test]
    fn test_search_with_k_larger_than_len() {
        let index = sample_index();
        let hits = index.search(&[0.0, 1.0], 10, 20, None).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].text, "north");
    }

    #[test]
    fn test_search_zero_k() {
        let index = sample_index();
        assert!(index.search(&[1.0, 0.0], 0, 20, None).unwrap().is_empty());
    }

    #[test]
    fn test_filter_applies_after_fetch() {
        let index = sample_index();
        let only_north: &SearchFilter = &|text: &str| text.starts_with("north");

        let hits = index.search(&[1.0, 0.0], 1, 20, Some(only_north)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "north-east");

        // fetch_k narrower than the match pool: only the top candidate is considered
        let hits = index.search(&[1.0, 0.0], 1, 1, Some(only_north)).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_filter_never_looks_past_fetch_k() {
        let index = sample_index();
        let accept_all: &SearchFilter = &|_: &str| true;

        let hits = index.search(&[1.0, 0.0], 5, 2, Some(accept_all)).unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["east", "north-east"]);
    }

    #[test]
    fn test_add_in_place_keeps_identity() {
        let mut index = sample_index();
        let id = index.id();
        index.add(&[entry("south", vec![0.0, -1.0])]).unwrap();

        assert_eq!(index.id(), id);
        assert_eq!(index.len(), 4);
        let hits = index.search(&[0.0, -1.0], 1, 20, None).unwrap();
        assert_eq!(hits[0].text, "south");
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut index = sample_index();
        let err = index.add(&[entry("bad", vec![1.0, 2.0, 3.0])]).unwrap_err();
        assert!(matches!(
            err,
            KnowledgeError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(index.len(), 3);
        assert!(index.search(&[1.0], 1, 20, None).is_err());
    }

    #[test]
    fn test_build_from_nothing_fails() {
        assert!(FlatIndexProvider.build(&[]).is_err());
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
