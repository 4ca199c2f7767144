//! Content fingerprints used as index cache keys.
//!
//! A fingerprint covers the knowledge base id and the set of document ids it
//! currently holds. Document text is left out: documents are immutable, so
//! membership already pins down the content.

use crate::types::KnowledgeBase;
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 digest of a knowledge base's identity and membership.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First eight hex digits, for log lines.
    pub fn short(&self) -> String {
        self.0[..4].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

/// Compute the fingerprint of a knowledge base's current state.
///
/// Ids are sorted before hashing, so insertion order never matters.
pub fn fingerprint(kb: &KnowledgeBase) -> Fingerprint {
    let mut ids: Vec<_> = kb.document_ids().collect();
    ids.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(kb.id().as_bytes());
    hasher.update((ids.len() as u64).to_le_bytes());
    for id in ids {
        hasher.update(id.as_bytes());
    }

    Fingerprint(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DocumentId, EmbeddedDocument, KnowledgeBaseId};

    fn doc(id: DocumentId, text: &str) -> EmbeddedDocument {
        EmbeddedDocument::new(id, text, vec![0.0, 1.0])
    }

    #[test]
    fn test_fingerprint_is_reproducible() {
        let mut kb = KnowledgeBase::new("kb");
        kb.insert(doc(DocumentId::new(), "a"));
        assert_eq!(fingerprint(&kb), fingerprint(&kb));
    }

    #[test]
    fn test_fingerprint_ignores_insertion_order() {
        let kb_id = KnowledgeBaseId::new();
        let (a, b, c) = (DocumentId::new(), DocumentId::new(), DocumentId::new());

        let mut first = KnowledgeBase::with_id(kb_id, "kb");
        for id in [a, b, c] {
            first.insert(doc(id, "x"));
        }
        let mut second = KnowledgeBase::with_id(kb_id, "kb");
        for id in [c, a, b] {
            second.insert(doc(id, "x"));
        }

        assert_eq!(fingerprint(&first), fingerprint(&second));
    }

    #[test]
    fn test_fingerprint_tracks_membership_not_text() {
        let kb_id = KnowledgeBaseId::new();
        let id = DocumentId::new();

        let mut first = KnowledgeBase::with_id(kb_id, "kb");
        first.insert(doc(id, "one text"));
        let mut second = KnowledgeBase::with_id(kb_id, "renamed");
        second.insert(doc(id, "another text"));
        assert_eq!(fingerprint(&first), fingerprint(&second));

        let before = fingerprint(&first);
        first.insert(doc(DocumentId::new(), "extra"));
        assert_ne!(before, fingerprint(&first));
    }

    #[test]
    fn test_fingerprint_depends_on_identity() {
        let id = DocumentId::new();
        let mut first = KnowledgeBase::new("kb");
        first.insert(doc(id, "same"));
        let mut second = KnowledgeBase::new("kb");
        second.insert(doc(id, "same"));

        assert_ne!(fingerprint(&first), fingerprint(&second));
        assert_ne!(
            fingerprint(&KnowledgeBase::new("a")),
            fingerprint(&KnowledgeBase::new("a"))
        );
    }

    #[test]
    fn test_display_is_full_hex() {
        let fp = fingerprint(&KnowledgeBase::new("kb"));
        assert_eq!(fp.to_string().len(), 64);
        assert!(fp.to_string().starts_with(&fp.short()));
    }
}
