//! The knowledge store: entries loaded once at startup, read-only afterwards.
//!
//! Alongside each entry the store keeps its normalized searchable text, so
//! retrieval never re-normalizes the corpus per request.

use bluechat_core::error::KnowledgeError;
use bluechat_core::knowledge::KnowledgeEntry;
use std::path::Path;
use tracing::{error, info, warn};

use crate::normalize::normalize;

/// An immutable, ordered collection of knowledge entries.
///
/// Shared across request handlers behind an `Arc` without locking.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeStore {
    entries: Vec<KnowledgeEntry>,
    normalized: Vec<String>,
}

impl KnowledgeStore {
    /// Build a store from entries, preserving their order.
    pub fn from_entries(entries: Vec<KnowledgeEntry>) -> Self {
        let normalized = entries
            .iter()
            .map(|e| normalize(&e.searchable_text()))
            .collect();
        Self {
            entries,
            normalized,
        }
    }

    /// An empty store (retrieval always misses).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a knowledge document: a JSON array of
    /// `{category, question, answer, keywords}` records.
    pub fn load(path: &Path) -> Result<Self, KnowledgeError> {
        let content = std::fs::read_to_string(path).map_err(|e| KnowledgeError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let entries: Vec<KnowledgeEntry> =
            serde_json::from_str(&content).map_err(|e| KnowledgeError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self::from_entries(entries))
    }

    /// Load the document, degrading to an empty store when it is missing or
    /// unreadable. The gateway still serves plain backend answers then.
    pub fn load_or_empty(path: &Path) -> Self {
        if !path.exists() {
            warn!(path = %path.display(), "Knowledge document not found, retrieval disabled");
            return Self::empty();
        }

        match Self::load(path) {
            Ok(store) => {
                info!(entries = store.len(), path = %path.display(), "Loaded knowledge entries");
                store
            }
            Err(e) => {
                error!(error = %e, "Failed to load knowledge document, retrieval disabled");
                Self::empty()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    /// Entries paired with their normalized searchable text, in store order.
    pub fn indexed(&self) -> impl Iterator<Item = (&KnowledgeEntry, &str)> {
        self.entries
            .iter()
            .zip(self.normalized.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"[
        {"category": "Ciencia", "question": "¿Qué es la fotosíntesis?",
         "answer": "La fotosíntesis convierte luz en energía química.",
         "keywords": ["fotosintesis"]},
        {"category": "Tecnología", "question": "¿Qué es STEM?",
         "answer": "Ciencia, Tecnología, Ingeniería y Matemáticas.", "keywords": []}
    ]"#;

    #[test]
    fn load_preserves_document_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bluebook.json");
        std::fs::write(&path, DOC).unwrap();

        let store = KnowledgeStore::load(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.entries()[0].category, "Ciencia");
        assert_eq!(store.entries()[1].category, "Tecnología");
    }

    #[test]
    fn normalized_text_is_precomputed() {
        let store = KnowledgeStore::from_entries(vec![KnowledgeEntry::new(
            "Tecnología",
            "¿Qué?",
            "Energía",
        )]);
        let (_, text) = store.indexed().next().unwrap();
        assert_eq!(text, "tecnologia ¿que? energia");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let result = KnowledgeStore::load(Path::new("/nonexistent/bluebook.json"));
        assert!(matches!(result, Err(KnowledgeError::Read { .. })));
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bluebook.json");
        std::fs::write(&path, r#"{"not": "an array"}"#).unwrap();
        assert!(matches!(
            KnowledgeStore::load(&path),
            Err(KnowledgeError::Parse { .. })
        ));
    }

    #[test]
    fn load_or_empty_degrades() {
        let store = KnowledgeStore::load_or_empty(Path::new("/nonexistent/bluebook.json"));
        assert!(store.is_empty());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bluebook.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(KnowledgeStore::load_or_empty(&path).is_empty());
    }
}
