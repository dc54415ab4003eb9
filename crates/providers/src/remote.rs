//! Remote backend: a hosted, OpenAI-compatible chat completions API.
//!
//! Works with Groq (the default), OpenAI, OpenRouter, Ollama, vLLM and any
//! endpoint exposing `/chat/completions`. Only the most recent
//! `history_window` messages are sent, each cut to the validator's length
//! cap, to bound upstream cost.

use async_trait::async_trait;
use bluechat_config::{AppConfig, RemoteConfig};
use bluechat_core::backend::Backend;
use bluechat_core::error::BackendError;
use bluechat_core::knowledge::KnowledgeEntry;
use bluechat_core::message::{Conversation, Message};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::prompt;

/// A backend that forwards each conversation to a hosted completion API.
pub struct RemoteBackend {
    name: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    history_window: usize,
    max_message_chars: usize,
    client: reqwest::Client,
}

impl RemoteBackend {
    /// Create a remote backend.
    ///
    /// A missing `api_key` is not an error here: the backend is still built
    /// and every `generate` call fails with [`BackendError::NotConfigured`].
    pub fn new(
        config: &RemoteConfig,
        max_message_chars: usize,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: config.name.clone(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            max_tokens: config.max_tokens,
            history_window: config.history_window,
            max_message_chars,
            client,
        })
    }

    /// Build from the full application config.
    pub fn from_config(config: &AppConfig) -> Result<Self, BackendError> {
        Self::new(
            &config.backend.remote,
            config.limits.max_message_chars,
            Duration::from_secs(config.gateway.request_timeout_secs),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str, BackendError> {
        self.api_key.as_deref().ok_or_else(|| {
            BackendError::NotConfigured("no API key for the remote backend".into())
        })
    }

    /// Convert our messages to the API wire format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str(),
                content: m.content.clone(),
            })
            .collect()
    }

    fn request_body(
        &self,
        conversation: &Conversation,
        context: Option<&KnowledgeEntry>,
    ) -> ApiRequest {
        let history = conversation.recent(self.history_window, self.max_message_chars);
        let messages = prompt::build_messages(&history, context);

        ApiRequest {
            model: self.model.clone(),
            messages: Self::to_api_messages(&messages),
            max_tokens: self.max_tokens,
            stream: false,
        }
    }
}

fn map_reqwest_err(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(e.to_string())
    } else {
        BackendError::Network(e.to_string())
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        conversation: &Conversation,
        context: Option<&KnowledgeEntry>,
    ) -> Result<String, BackendError> {
        let api_key = self.api_key()?;
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(conversation, context);

        debug!(
            backend = %self.name,
            model = %self.model,
            messages = body.messages.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_err)?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(BackendError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(BackendError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Backend returned error");
            return Err(BackendError::Api {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        if let Some(error) = api_response.error {
            return Err(BackendError::Api {
                status_code: status,
                message: error.to_string(),
            });
        }

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::MalformedResponse("No choices in response".into()))?;

        let content = choice
            .message
            .content
            .ok_or_else(|| BackendError::MalformedResponse("Choice has no content".into()))?;

        Ok(prompt::clean_output(&content))
    }

    async fn health_check(&self) -> Result<bool, BackendError> {
        let api_key = self.api_key()?;
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(map_reqwest_err)?;

        Ok(response.status().is_success())
    }
}

// --- API wire types ---

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Option<(String, Value)>>>;

    /// Serve a fixed response at `/chat/completions`, recording the
    /// Authorization header and JSON body of the last request.
    async fn spawn_upstream(status: StatusCode, reply: Value) -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(None));
        let sink = captured.clone();

        let app = Router::new().route(
            "/chat/completions",
            post(move |headers: HeaderMap, Json(req): Json<Value>| {
                let sink = sink.clone();
                let reply = reply.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    *sink.lock().unwrap() = Some((auth, req));
                    (status, Json(reply))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), captured)
    }

    fn backend(url: &str, key: Option<&str>) -> RemoteBackend {
        let config = RemoteConfig {
            api_url: url.to_string(),
            api_key: key.map(String::from),
            ..RemoteConfig::default()
        };
        RemoteBackend::new(&config, 1000, Duration::from_secs(5)).unwrap()
    }

    fn completion(text: &str) -> Value {
        json!({"choices": [{"message": {"role": "assistant", "content": text}}]})
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let b = backend("http://127.0.0.1:9", None);
        assert!(!b.is_configured());
        let err = b
            .generate(&Conversation::new(vec![Message::user("hola")]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn blank_key_is_not_configured() {
        assert!(!backend("http://127.0.0.1:9", Some("  ")).is_configured());
    }

    #[tokio::test]
    async fn sends_preamble_context_and_bearer() {
        let (url, captured) = spawn_upstream(StatusCode::OK, completion("  ¡Hola!  \n")).await;
        let b = backend(&url, Some("gsk_test"));
        let entry = KnowledgeEntry::new("Biología", "¿Fotosíntesis?", "La luz se convierte en energía.");

        let text = b
            .generate(&Conversation::new(vec![Message::user("Explícame la fotosíntesis")]), Some(&entry))
            .await
            .unwrap();
        assert_eq!(text, "¡Hola!");

        let (auth, body) = captured.lock().unwrap().clone().unwrap();
        assert_eq!(auth, "Bearer gsk_test");
        assert_eq!(body["model"], "llama3-8b-8192");
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 500);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        let system = messages[0]["content"].as_str().unwrap();
        assert!(system.starts_with(prompt::SYSTEM_PREAMBLE));
        assert!(system.contains("La luz se convierte en energía."));
        assert_eq!(messages[1]["content"], "Explícame la fotosíntesis");
    }

    #[tokio::test]
    async fn history_is_windowed_and_truncated() {
        let (url, captured) = spawn_upstream(StatusCode::OK, completion("ok")).await;
        let b = backend(&url, Some("k"));

        let history: Vec<Message> = (0..8)
            .map(|i| Message::user(format!("{i}{}", "x".repeat(1500))))
            .collect();
        b.generate(&Conversation::new(history), None).await.unwrap();

        let (_, body) = captured.lock().unwrap().clone().unwrap();
        let messages = body["messages"].as_array().unwrap();
        // System message + the last five.
        assert_eq!(messages.len(), 6);
        assert!(messages[1]["content"].as_str().unwrap().starts_with('3'));
        for m in &messages[1..] {
            assert_eq!(m["content"].as_str().unwrap().chars().count(), 1000);
        }
    }

    #[tokio::test]
    async fn upstream_status_codes_map_to_errors() {
        let (url, _) = spawn_upstream(StatusCode::TOO_MANY_REQUESTS, json!({})).await;
        let conv = Conversation::new(vec![Message::user("hola")]);
        assert!(matches!(
            backend(&url, Some("k")).generate(&conv, None).await,
            Err(BackendError::RateLimited { .. })
        ));

        let (url, _) = spawn_upstream(StatusCode::UNAUTHORIZED, json!({})).await;
        assert!(matches!(
            backend(&url, Some("k")).generate(&conv, None).await,
            Err(BackendError::AuthenticationFailed(_))
        ));

        let (url, _) = spawn_upstream(StatusCode::BAD_GATEWAY, json!({"detail": "down"})).await;
        assert!(matches!(
            backend(&url, Some("k")).generate(&conv, None).await,
            Err(BackendError::Api { status_code: 502, .. })
        ));
    }

    #[tokio::test]
    async fn error_payload_is_a_failure() {
        let (url, _) = spawn_upstream(
            StatusCode::OK,
            json!({"error": {"message": "model overloaded"}}),
        )
        .await;
        let err = backend(&url, Some("k"))
            .generate(&Conversation::new(vec![Message::user("hola")]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Api { .. }));
    }

    #[tokio::test]
    async fn empty_choices_is_malformed() {
        let (url, _) = spawn_upstream(StatusCode::OK, json!({"choices": []})).await;
        let err = backend(&url, Some("k"))
            .generate(&Conversation::new(vec![Message::user("hola")]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_network_error() {
        // Port 9 (discard) is not listening on loopback.
        let err = backend("http://127.0.0.1:9", Some("k"))
            .generate(&Conversation::new(vec![Message::user("hola")]), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BackendError::Network(_) | BackendError::Timeout(_)
        ));
    }
}
