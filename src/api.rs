//! REST API server
//!
//! Chat front-end adapter over the orchestrator, plus document ingestion and
//! turn audit lookup.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::Orchestrator;
use crate::app::AppContext;
use crate::audit::TurnAuditLog;
use crate::error::OrchestrationError;
use crate::notify::{ChannelSink, CollectingSink, TurnEvent, TurnSinks};
use crate::rag::DocumentIngestor;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// Content of the last user message, if any and not blank
    fn objective(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .filter(|content| !content.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct DocumentParams {
    pub filename: Option<String>,
    pub collection: Option<String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub ingestor: Arc<DocumentIngestor>,
    pub audit_log: Arc<TurnAuditLog>,
    pub default_collection: String,
}

impl ApiState {
    pub fn from_context(context: &AppContext) -> Self {
        Self {
            orchestrator: context.orchestrator.clone(),
            ingestor: context.ingestor.clone(),
            audit_log: context.audit_log.clone(),
            default_collection: context.config.rag_collection.clone(),
        }
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoints
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let Some(objective) = req.objective() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("No user message found".into())),
        );
    };

    info!("Received chat turn: {}", objective);

    let sink = Arc::new(CollectingSink::new());
    let sinks = TurnSinks::shared(sink.clone());

    match state
        .orchestrator
        .run_turn_with(objective, &sinks, CancellationToken::new())
        .await
    {
        Ok(outcome) => {
            let progress: Vec<TurnEvent> = sink
                .events()
                .await
                .into_iter()
                .filter(|event| matches!(event, TurnEvent::Progress { .. }))
                .collect();

            (
                StatusCode::OK,
                Json(ApiResponse::success(serde_json::json!({
                    "answer": outcome.answer,
                    "turn_id": outcome.turn_id,
                    "history": outcome.history,
                    "iterations": outcome.iterations,
                    "execution_time_ms": outcome.execution_time_ms,
                    "progress": progress,
                }))),
            )
        }
        Err(e) => (
            turn_failure_status(&e),
            Json(ApiResponse::error(format!("Turn failed: {}", e))),
        ),
    }
}

/// Request problems are rejected before a turn starts, so a failed turn is
/// a server-side failure.
fn turn_failure_status(err: &OrchestrationError) -> StatusCode {
    match err {
        OrchestrationError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn sse_event(event: &TurnEvent) -> Event {
    let name = match event {
        TurnEvent::Progress { .. } => "progress",
        TurnEvent::Answer { .. } => "answer",
        TurnEvent::Failed { .. } => "error",
    };
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(name).data(data)
}

/// Streams `progress` events, then one `answer` or `error` event.
/// Dropping the stream (client disconnect) cancels the turn.
async fn chat_stream_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, Json<ApiResponse>)> {
    let Some(objective) = req.objective().map(str::to_string) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("No user message found".into())),
        ));
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<TurnEvent>();
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        let sinks = TurnSinks::shared(Arc::new(ChannelSink::new(tx.clone())));
        if let Err(e) = orchestrator.run_turn_with(&objective, &sinks, cancel).await {
            // receiver may already be gone after a disconnect
            let _ = tx.send(TurnEvent::Failed {
                error: e.to_string(),
            });
        }
    });

    let stream = async_stream::stream! {
        let _guard = guard;

        while let Some(event) = rx.recv().await {
            let terminal = !matches!(event, TurnEvent::Progress { .. });
            yield Ok(sse_event(&event));
            if terminal {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

/// =============================
/// Document Ingestion
/// =============================

async fn ingest_document(
    State(state): State<ApiState>,
    Query(params): Query<DocumentParams>,
    body: Bytes,
) -> (StatusCode, Json<ApiResponse>) {
    let filename = params
        .filename
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| "document.txt".to_string());
    let collection = params
        .collection
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| state.default_collection.clone());

    match state.ingestor.ingest(&collection, &body, &filename).await {
        Ok(report) => (StatusCode::OK, Json(ApiResponse::success(report))),
        Err(e) => {
            warn!(%filename, %collection, error = %e, "Document ingestion failed");
            (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(e.to_string())),
            )
        }
    }
}

/// =============================
/// Turn Audit
/// =============================

async fn get_turn(
    State(state): State<ApiState>,
    Path(turn_id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.audit_log.get(turn_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(ApiResponse::success(record))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Turn {} not found", turn_id))),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .route("/api/documents", post(ingest_document))
        .route("/api/turns/:turn_id", get(get_turn))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
