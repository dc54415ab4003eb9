//! HTTP gateway for BlueChat.
//!
//! Exposes `POST /api/chat`, which runs the [`ChatPipeline`], and
//! `GET /health`. Built on Axum; the idle-client sweeper runs alongside
//! the server on its own task.

pub mod client_id;
pub mod pipeline;

use axum::extract::DefaultBodyLimit;
use axum::extract::rejection::JsonRejection;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use bluechat_config::{AppConfig, GatewayConfig};
use bluechat_core::message::{Conversation, Message};
use bluechat_knowledge::KnowledgeStore;
use bluechat_security::AdmissionController;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{Instrument, debug, info, info_span, warn};

pub use client_id::ClientId;
pub use pipeline::{ChatPipeline, ChatReply};

/// Shared application state.
pub struct GatewayState {
    pub pipeline: ChatPipeline,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl GatewayState {
    pub fn new(pipeline: ChatPipeline) -> Self {
        Self {
            pipeline,
            started_at: chrono::Utc::now(),
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
///
/// Layers applied:
/// - Request body size limit (`max_body_bytes`)
/// - Permissive CORS when `cors` is enabled
/// - HTTP trace logging
pub fn build_router(state: SharedState, config: &GatewayConfig) -> Router {
    let router = Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes));

    let router = if config.cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };

    router.layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server and run it until Ctrl-C.
///
/// Loads the knowledge store, builds the configured backend (loading a
/// local model if selected), starts the sweeper and serves.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let knowledge = Arc::new(KnowledgeStore::load_or_empty(&config.knowledge.path));

    let backend = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || bluechat_providers::build_from_config(&config))
            .await??
    };

    let pipeline = ChatPipeline::from_config(&config, knowledge, backend);
    let sweeper = spawn_sweeper(
        pipeline.admission().clone(),
        Duration::from_secs(config.gateway.sweep_interval_secs),
    );

    let state = Arc::new(GatewayState::new(pipeline));
    let app = build_router(state, &config.gateway);

    info!(addr = %addr, backend = config.backend.active_name(), "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Periodically evict clients with no activity in the last hour.
pub fn spawn_sweeper(admission: Arc<AdmissionController>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = admission.sweep_idle(Instant::now());
            debug!(
                removed,
                tracked = admission.tracked_clients(),
                "Swept idle clients"
            );
        }
    })
}

// --- Handlers ---

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct ContentBlock {
    text: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    content: Vec<ContentBlock>,
    source: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

async fn chat_handler(
    State(state): State<SharedState>,
    ClientId(client): ClientId,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        debug!(error = %rejection.body_text(), "Unreadable chat body");
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            api_error(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
        } else {
            api_error(StatusCode::BAD_REQUEST, "Invalid request body")
        }
    })?;

    let request_id = uuid::Uuid::new_v4();
    let span = info_span!(
        "chat",
        %request_id,
        client = %client.chars().take(45).collect::<String>()
    );

    let reply = state
        .pipeline
        .handle(&client, Conversation::new(request.messages))
        .instrument(span)
        .await
        .map_err(|e| {
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            api_error(status, e.public_message())
        })?;

    Ok(Json(ChatResponse {
        content: vec![ContentBlock { text: reply.text }],
        source: reply.source,
    }))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    knowledge_entries: usize,
    backend: String,
    uptime_secs: i64,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        knowledge_entries: state.pipeline.knowledge().len(),
        backend: state.pipeline.backend_name().to_string(),
        uptime_secs: (chrono::Utc::now() - state.started_at).num_seconds(),
    })
}
