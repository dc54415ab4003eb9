//! Offline importer: Bluebook markdown → knowledge entries.
//!
//! Each `#### ` section after the science chapter marker becomes one entry.
//! Runs from the CLI, never on the request path.

use bluechat_core::knowledge::KnowledgeEntry;
use regex_lite::Regex;
use std::sync::LazyLock;

/// Text marking the start of the relevant part of the document.
pub const SECTION_START_MARKER: &str = "Fundamentación Científica del Modelo";

/// Category assigned to every imported entry.
pub const IMPORT_CATEGORY: &str = "Bluebook Science & Tech";

/// Sections whose cleaned body is this short or shorter are skipped.
const MIN_BODY_CHARS: usize = 50;

/// Answers are cut to this many characters to fit the prompt budget.
const MAX_ANSWER_CHARS: usize = 1000;

static PAGE_NUMBER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\d+\n").expect("page number pattern is valid"));
static BLANK_LINE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("blank line pattern is valid"));

/// Convert the Bluebook markdown into knowledge entries.
///
/// Returns an empty list when the start marker is absent.
pub fn parse_bluebook_markdown(content: &str) -> Vec<KnowledgeEntry> {
    let Some(start) = content.find(SECTION_START_MARKER) else {
        return Vec::new();
    };

    content[start..]
        .split("#### ")
        .skip(1)
        .filter_map(parse_section)
        .collect()
}

fn parse_section(section: &str) -> Option<KnowledgeEntry> {
    let mut lines = section.split('\n');
    let title = lines.next().unwrap_or_default().trim();
    let body = lines.collect::<Vec<_>>().join("\n");
    let body = clean_body(body.trim());

    if body.chars().count() <= MIN_BODY_CHARS {
        return None;
    }

    Some(KnowledgeEntry {
        category: IMPORT_CATEGORY.to_string(),
        question: format!("Explícame sobre: {title}"),
        answer: body.chars().take(MAX_ANSWER_CHARS).collect(),
        keywords: title
            .to_lowercase()
            .split_whitespace()
            .map(String::from)
            .collect(),
    })
}

/// Drop lone page-number lines and collapse blank-line runs.
fn clean_body(body: &str) -> String {
    let without_pages = PAGE_NUMBER_LINE.replace_all(body, "");
    BLANK_LINE_RUN
        .replace_all(&without_pages, "\n")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_body(word: &str) -> String {
        format!("{word} ").repeat(20)
    }

    #[test]
    fn missing_marker_yields_nothing() {
        let doc = format!("#### 1.1 Historia\n{}", long_body("texto"));
        assert!(parse_bluebook_markdown(&doc).is_empty());
    }

    #[test]
    fn sections_become_entries() {
        let doc = format!(
            "Preámbulo\n## {SECTION_START_MARKER}\nintro\n#### 1.1 Historia de la Ciencia\n{}\n#### 1.2 Método Científico\n{}",
            long_body("historia"),
            long_body("método"),
        );

        let entries = parse_bluebook_markdown(&doc);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].category, IMPORT_CATEGORY);
        assert_eq!(entries[0].question, "Explícame sobre: 1.1 Historia de la Ciencia");
        assert_eq!(entries[0].keywords, vec!["1.1", "historia", "de", "la", "ciencia"]);
        assert!(entries[1].answer.starts_with("método"));
    }

    #[test]
    fn short_sections_are_skipped() {
        let doc = format!("{SECTION_START_MARKER}\n#### Corto\nmuy poco texto\n");
        assert!(parse_bluebook_markdown(&doc).is_empty());
    }

    #[test]
    fn page_numbers_and_blank_runs_removed() {
        let body = "primera línea de contenido suficientemente larga\n72\nsegunda línea\n\n\n\ntercera línea de texto";
        let cleaned = clean_body(body);
        assert!(!cleaned.contains("72"));
        assert!(!cleaned.contains("\n\n"));
        assert!(cleaned.contains("tercera"));
    }

    #[test]
    fn answers_are_capped() {
        let doc = format!("{SECTION_START_MARKER}\n#### Largo\n{}", "á".repeat(3000));
        let entries = parse_bluebook_markdown(&doc);
        assert_eq!(entries[0].answer.chars().count(), MAX_ANSWER_CHARS);
    }
}
