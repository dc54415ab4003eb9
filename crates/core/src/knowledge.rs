//! Knowledge entries and retrieval results.
//!
//! Entries are produced offline, loaded once at startup, and never mutated.
//! Their identity is their position in the knowledge document.

use serde::{Deserialize, Serialize};

/// One record of the knowledge document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub category: String,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl KnowledgeEntry {
    pub fn new(
        category: impl Into<String>,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            question: question.into(),
            answer: answer.into(),
            keywords: Vec::new(),
        }
    }

    /// The text retrieval scores against: category, question and answer.
    pub fn searchable_text(&self) -> String {
        format!("{} {} {}", self.category, self.question, self.answer)
    }
}

/// The best-matching entry for a query, with its score.
///
/// A retrieval only exists when the score is at least 1; "no match" is
/// represented as `Option::<Retrieval>::None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieval {
    pub entry: KnowledgeEntry,
    pub score: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_optional_in_documents() {
        let entry: KnowledgeEntry = serde_json::from_str(
            r#"{"category":"Ciencia","question":"¿Qué es?","answer":"Una respuesta"}"#,
        )
        .unwrap();
        assert!(entry.keywords.is_empty());
    }

    #[test]
    fn searchable_text_joins_fields_in_order() {
        let entry = KnowledgeEntry::new("Cat", "Q", "A");
        assert_eq!(entry.searchable_text(), "Cat Q A");
    }
}
