//! Request validation: shape and size limits plus a phrase block-list.
//!
//! The block-list is a coarse, case-insensitive substring heuristic against
//! prompt-override and credential-exfiltration attempts. It is best-effort
//! and not a security boundary.

use bluechat_config::LimitsConfig;
use bluechat_core::message::Conversation;

/// Limits enforced by the [`RequestValidator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationLimits {
    pub max_messages: usize,
    pub max_message_chars: usize,
    pub blocked_phrases: Vec<String>,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for ValidationLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            max_messages: config.max_messages,
            max_message_chars: config.max_message_chars,
            blocked_phrases: config.blocked_phrases.clone(),
        }
    }
}

/// Why a conversation was rejected. The message is returned to the caller
/// verbatim, so it never echoes user content.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("No messages")]
    Empty,

    #[error("Too many messages: {count} (max {max})")]
    TooManyMessages { count: usize, max: usize },

    #[error("Message {index} is too long: {chars} characters (max {max})")]
    MessageTooLong {
        index: usize,
        chars: usize,
        max: usize,
    },

    #[error("Message {index} contains blocked content")]
    BlockedContent { index: usize },
}

/// Stateless conversation validator.
#[derive(Debug, Clone)]
pub struct RequestValidator {
    max_messages: usize,
    max_message_chars: usize,
    /// Lowercased once at construction.
    blocked: Vec<String>,
}

impl RequestValidator {
    pub fn new(limits: ValidationLimits) -> Self {
        let blocked = limits
            .blocked_phrases
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        Self {
            max_messages: limits.max_messages,
            max_message_chars: limits.max_message_chars,
            blocked,
        }
    }

    pub fn max_message_chars(&self) -> usize {
        self.max_message_chars
    }

    /// Check `conversation` against each rule in turn; the first failure wins.
    ///
    /// Rules run across the whole conversation one at a time, so a count
    /// violation is reported before any length violation, and a length
    /// violation before any blocked phrase.
    pub fn validate(&self, conversation: &Conversation) -> Result<(), ValidationError> {
        if conversation.is_empty() {
            return Err(ValidationError::Empty);
        }

        if conversation.len() > self.max_messages {
            return Err(ValidationError::TooManyMessages {
                count: conversation.len(),
                max: self.max_messages,
            });
        }

        for (index, message) in conversation.messages.iter().enumerate() {
            let chars = message.char_len();
            if chars > self.max_message_chars {
                return Err(ValidationError::MessageTooLong {
                    index,
                    chars,
                    max: self.max_message_chars,
                });
            }
        }

        for (index, message) in conversation.messages.iter().enumerate() {
            let lower = message.content.to_lowercase();
            if let Some(phrase) = self.blocked.iter().find(|p| lower.contains(p.as_str())) {
                tracing::debug!(index, phrase = %phrase, "Blocked phrase matched");
                return Err(ValidationError::BlockedContent { index });
            }
        }

        Ok(())
    }
}

impl Default for RequestValidator {
    fn default() -> Self {
        Self::new(ValidationLimits::default())
    }
}
