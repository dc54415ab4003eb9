//! Backend trait: the abstraction over text-generation engines.
//!
//! A Backend turns a conversation plus an optional retrieved knowledge entry
//! into reply text. Implementations: hosted OpenAI-compatible API, local
//! GGUF model. The gateway never knows which one it is talking to.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::knowledge::KnowledgeEntry;
use crate::message::Conversation;

/// Provenance tag for replies grounded in a retrieved knowledge entry.
pub const RAG_SOURCE: &str = "bluebook-rag";

/// The core Backend trait.
///
/// Every generation engine implements this trait. Implementations must
/// prepend the shared system preamble, inject `context` when present, and
/// return the reply with surrounding whitespace trimmed.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Identifier used as the response provenance when no context was injected
    /// (e.g. "qwen-general", "qwen-local").
    fn name(&self) -> &str;

    /// Generate a reply for the conversation.
    async fn generate(
        &self,
        conversation: &Conversation,
        context: Option<&KnowledgeEntry>,
    ) -> Result<String, BackendError>;

    /// Health check: is the backend usable right now?
    async fn health_check(&self) -> Result<bool, BackendError> {
        Ok(true)
    }
}
