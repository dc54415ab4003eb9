//! Error types for the BlueChat domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`GatewayError`] is the
//! request-level taxonomy the HTTP layer maps onto status codes.

use thiserror::Error;

/// Message returned to callers for every backend or internal failure.
pub const GENERIC_FAILURE_MESSAGE: &str = "Internal AI Error";

/// Message returned to callers when no backend credential is configured.
pub const NOT_CONFIGURED_MESSAGE: &str = "AI service not configured";

/// The outcome taxonomy of a single chat request.
///
/// `Throttled` and `InvalidRequest` carry reasons that are safe to show to
/// the caller. `BackendUnavailable` and `Internal` carry detail that is only
/// ever logged; [`GatewayError::public_message`] replaces it with a fixed text.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Throttled: {0}")]
    Throttled(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(#[from] BackendError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status code for this outcome.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Throttled(_) => 429,
            Self::InvalidRequest(_) => 400,
            Self::BackendUnavailable(_) | Self::Internal(_) => 500,
        }
    }

    /// The text that may be sent to the caller.
    pub fn public_message(&self) -> String {
        match self {
            Self::Throttled(reason) | Self::InvalidRequest(reason) => reason.clone(),
            Self::BackendUnavailable(BackendError::NotConfigured(_)) => {
                NOT_CONFIGURED_MESSAGE.to_string()
            }
            Self::BackendUnavailable(_) | Self::Internal(_) => {
                GENERIC_FAILURE_MESSAGE.to_string()
            }
        }
    }
}

/// Result type alias using [`GatewayError`].
pub type Result<T> = std::result::Result<T, GatewayError>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Backend not configured: {0}")]
    NotConfigured(String),

    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by upstream, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Inference error: {0}")]
    Inference(String),
}

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Failed to read knowledge document at {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse knowledge document at {path}: {reason}")]
    Parse { path: String, reason: String },
}
