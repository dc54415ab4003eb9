//! Lexical context retrieval.
//!
//! Scores every entry by how many distinct query tokens occur as substrings
//! of its normalized text and returns the single best entry. Ties go to the
//! entry that comes first in the store; a best score of 0 is a miss.

use bluechat_core::knowledge::Retrieval;

use crate::normalize::normalize;
use crate::store::KnowledgeStore;

/// Tokens of this many characters or fewer are treated as stop words.
pub const MIN_TOKEN_CHARS: usize = 3;

/// Normalized, de-duplicated query tokens longer than [`MIN_TOKEN_CHARS`].
///
/// The query is split on whitespace and leading/trailing punctuation is
/// trimmed from each piece, so `"¿fotosíntesis?"` yields `"fotosintesis"`.
pub fn query_tokens(query: &str) -> Vec<String> {
    let normalized = normalize(query);
    let mut tokens: Vec<String> = Vec::new();

    for raw in normalized.split_whitespace() {
        let token = raw.trim_matches(|c: char| !c.is_alphanumeric());
        if token.chars().count() <= MIN_TOKEN_CHARS {
            continue;
        }
        if !tokens.iter().any(|t| t == token) {
            tokens.push(token.to_string());
        }
    }

    tokens
}

/// Find the best-matching entry for `query`, or `None` when nothing matches.
pub fn retrieve(query: &str, store: &KnowledgeStore) -> Option<Retrieval> {
    let tokens = query_tokens(query);
    if tokens.is_empty() {
        return None;
    }

    let mut best: Option<(usize, usize)> = None;

    for (index, (_, text)) in store.indexed().enumerate() {
        let score = tokens.iter().filter(|t| text.contains(t.as_str())).count();
        // Strictly greater: the first entry reaching a score keeps it.
        if score > best.map_or(0, |(_, s)| s) {
            best = Some((index, score));
        }
    }

    best.map(|(index, score)| Retrieval {
        entry: store.entries()[index].clone(),
        score,
    })
}

impl KnowledgeStore {
    /// Convenience wrapper around [`retrieve`].
    pub fn retrieve(&self, query: &str) -> Option<Retrieval> {
        retrieve(query, self)
    }
}
