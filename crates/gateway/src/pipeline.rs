//! The chat pipeline: admission, validation, retrieval, generation.
//!
//! Each request moves through the same steps and stops at the first one
//! that fails. Throttled and rejected requests never reach the backend;
//! backend failures are logged in full and surface only as a
//! [`GatewayError::BackendUnavailable`].

use bluechat_config::AppConfig;
use bluechat_core::backend::{Backend, RAG_SOURCE};
use bluechat_core::error::{BackendError, GatewayError, Result};
use bluechat_core::message::Conversation;
use bluechat_knowledge::KnowledgeStore;
use bluechat_security::{AdmissionController, AdmissionLimits, RequestValidator, ValidationLimits};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// A successful reply and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    /// [`RAG_SOURCE`] when retrieved context was used, else the backend name.
    pub source: String,
}

/// Orchestrates one chat request end to end.
pub struct ChatPipeline {
    admission: Arc<AdmissionController>,
    validator: RequestValidator,
    knowledge: Arc<KnowledgeStore>,
    backend: Arc<dyn Backend>,
    timeout: Duration,
}

impl ChatPipeline {
    pub fn new(
        admission: Arc<AdmissionController>,
        validator: RequestValidator,
        knowledge: Arc<KnowledgeStore>,
        backend: Arc<dyn Backend>,
        timeout: Duration,
    ) -> Self {
        Self {
            admission,
            validator,
            knowledge,
            backend,
            timeout,
        }
    }

    /// Build a pipeline with limits and timeout taken from `config`.
    pub fn from_config(
        config: &AppConfig,
        knowledge: Arc<KnowledgeStore>,
        backend: Arc<dyn Backend>,
    ) -> Self {
        Self::new(
            Arc::new(AdmissionController::new(AdmissionLimits::from(&config.limits))),
            RequestValidator::new(ValidationLimits::from(&config.limits)),
            knowledge,
            backend,
            Duration::from_secs(config.gateway.request_timeout_secs),
        )
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    pub fn knowledge(&self) -> &KnowledgeStore {
        &self.knowledge
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Run `conversation` from `client_id` through every step.
    pub async fn handle(&self, client_id: &str, conversation: Conversation) -> Result<ChatReply> {
        self.admission
            .check_and_record(client_id)
            .map_err(|e| GatewayError::Throttled(e.to_string()))?;

        if let Err(e) = self.validator.validate(&conversation) {
            info!(reason = %e, messages = conversation.len(), "Request rejected");
            return Err(GatewayError::InvalidRequest(e.to_string()));
        }

        let retrieval = conversation
            .last_user_message()
            .and_then(|query| self.knowledge.retrieve(query));

        match &retrieval {
            Some(hit) => info!(
                category = %hit.entry.category,
                score = hit.score,
                "Retrieved context"
            ),
            None => debug!("No context retrieved"),
        }

        let context = retrieval.as_ref().map(|r| &r.entry);
        let generated = tokio::time::timeout(
            self.timeout,
            self.backend.generate(&conversation, context),
        )
        .await
        .unwrap_or_else(|_| {
            Err(BackendError::Timeout(format!(
                "no reply within {}s",
                self.timeout.as_secs()
            )))
        });

        let text = generated.map_err(|e| {
            error!(backend = self.backend.name(), error = %e, "Backend call failed");
            GatewayError::BackendUnavailable(e)
        })?;

        let source = if retrieval.is_some() {
            RAG_SOURCE.to_string()
        } else {
            self.backend.name().to_string()
        };

        Ok(ChatReply { text, source })
    }
}
