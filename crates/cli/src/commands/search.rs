//! `bluechat search`: Run the retriever against the knowledge base.

use bluechat_knowledge::{KnowledgeStore, query_tokens};
use std::path::Path;

/// Characters of the matched answer shown in the preview.
const PREVIEW_CHARS: usize = 240;

pub async fn run(config_path: Option<&Path>, query: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let store = KnowledgeStore::load(&config.knowledge.path)?;

    println!("🔎 {} entries in {}", store.len(), config.knowledge.path.display());
    println!("   Tokens: {:?}\n", query_tokens(query));

    match store.retrieve(query) {
        Some(hit) => {
            println!("  Category: {}", hit.entry.category);
            println!("  Question: {}", hit.entry.question);
            println!("  Score:    {}", hit.score);
            let preview: String = hit.entry.answer.chars().take(PREVIEW_CHARS).collect();
            println!("\n  {preview}");
            if hit.entry.answer.chars().count() > PREVIEW_CHARS {
                println!("  …");
            }
        }
        None => println!("  No matching entry; the backend would answer without context."),
    }

    Ok(())
}
