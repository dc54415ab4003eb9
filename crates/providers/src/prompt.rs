//! Prompt construction shared by every backend.
//!
//! Both variants send the same system preamble, with the retrieved answer
//! appended as a labeled block when retrieval found something.

use bluechat_core::knowledge::KnowledgeEntry;
use bluechat_core::message::{Message, Role};

/// Persona and rules sent ahead of every conversation.
pub const SYSTEM_PREAMBLE: &str = r#"You are "BlueChat", an intelligent assistant for JovenesSTEM.
Your source of truth is the "Bluebook v1" (Science & Technology Education).

RULES:
- Answer concisely in SPANISH (unless asked in English).
- If the context provided helps, USE IT correctly.
- If you don't know, say so. Do not invent.
- Be enthusiastic about Science, STEM, and Education."#;

/// Label that introduces retrieved context inside the system prompt.
pub const CONTEXT_LABEL: &str = "CONTEXT FROM BLUEBOOK:";

/// The system prompt, with `context`'s answer injected when present.
pub fn build_system_prompt(context: Option<&KnowledgeEntry>) -> String {
    match context {
        Some(entry) => format!(
            "{SYSTEM_PREAMBLE}\n\n{CONTEXT_LABEL}\n{}\n\nUse this context to answer the user.",
            entry.answer
        ),
        None => SYSTEM_PREAMBLE.to_string(),
    }
}

/// System message followed by `history`.
pub fn build_messages(history: &[Message], context: Option<&KnowledgeEntry>) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(Message::system(build_system_prompt(context)));
    messages.extend(history.iter().cloned());
    messages
}

/// Render messages with the ChatML template, ending on an open assistant turn.
pub fn format_chatml(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for msg in messages {
        prompt.push_str("<|im_start|>");
        prompt.push_str(msg.role.as_str());
        prompt.push('\n');
        prompt.push_str(&msg.content);
        prompt.push_str("<|im_end|>\n");
    }
    prompt.push_str("<|im_start|>");
    prompt.push_str(Role::Assistant.as_str());
    prompt.push('\n');
    prompt
}

/// Trim whitespace and any trailing end-of-turn markers from generated text.
pub fn clean_output(text: &str) -> String {
    let mut out = text.trim();
    loop {
        let stripped = out
            .trim_end_matches("<|im_end|>")
            .trim_end_matches("<|endoftext|>")
            .trim_end_matches("</s>")
            .trim_end();
        if stripped.len() == out.len() {
            break;
        }
        out = stripped;
    }
    out.to_string()
}
