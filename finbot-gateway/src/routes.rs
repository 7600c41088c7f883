//! Route definitions for the FinBot gateway.
//!
//! Provides the chat, feedback and health endpoints. Every route is also
//! mounted under `/api` for the browser client.

use crate::chat::{ChatError, ChatService};
use crate::session::FeedbackKind;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use finbot_common::error::Error;
use finbot_common::logging::{trace_id_from_headers, Metrics};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(chat: Arc<ChatService>) -> Self {
        Self {
            chat,
            metrics: Metrics::new(),
        }
    }
}

/// Chat request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Chat response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub session_id: String,
    pub response: String,
    pub relevant_terms: Vec<String>,
}

/// Feedback request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackBody {
    pub session_id: String,
    #[serde(rename = "type")]
    pub kind: FeedbackKind,
    pub message_index: usize,
    #[serde(default)]
    pub text: Option<String>,
}

/// Feedback acknowledgement.
#[derive(Debug, Serialize, Deserialize)]
pub struct FeedbackReply {
    pub status: String,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
    pub sessions: usize,
    pub requests: u64,
    pub errors: u64,
    pub avg_duration_ms: u64,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(error: &Error, session_id: Option<String>) -> ApiError {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            session_id,
        }),
    )
}

/// Oversized bodies keep their 413; every other malformed body is a 400.
fn rejection_response(rejection: &JsonRejection) -> ApiError {
    let status = match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(ErrorResponse {
            error: rejection.body_text(),
            session_id: None,
        }),
    )
}

/// Build the router with all routes and middleware.
pub fn build_router(state: AppState, body_limit_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(chat))
        .route("/api/chat", post(chat))
        .route("/feedback", post(feedback))
        .route("/api/feedback", post(feedback))
        .route("/health", get(health))
        .route("/api/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(cors)
        .with_state(state)
}

/// POST /chat
async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let trace_id = trace_id_from_headers(&headers);
    let span = finbot_common::request_span!("chat", trace_id);
    let start = Instant::now();

    let result = run_chat(&state, payload).instrument(span).await;

    state
        .metrics
        .record_request(start.elapsed().as_millis() as u64, result.is_ok())
        .await;
    result
}

async fn run_chat(
    state: &AppState,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let Json(body) = payload.map_err(|rejection| {
        tracing::warn!(error = %rejection.body_text(), "Rejected chat body");
        rejection_response(&rejection)
    })?;

    match state.chat.chat(&body.message, body.session_id.as_deref()).await {
        Ok(outcome) => Ok(Json(ChatReply {
            session_id: outcome.session_id,
            response: outcome.response,
            relevant_terms: outcome.relevant_terms,
        })),
        Err(ChatError { session_id, source }) => {
            if matches!(source, Error::InvalidInput(_)) {
                tracing::warn!(error = %source, "Rejected chat message");
            }
            Err(error_response(&source, session_id))
        }
    }
}

/// POST /feedback
async fn feedback(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<FeedbackBody>, JsonRejection>,
) -> Result<Json<FeedbackReply>, ApiError> {
    let trace_id = trace_id_from_headers(&headers);
    let span = finbot_common::request_span!("feedback", trace_id);
    let start = Instant::now();

    let result = run_feedback(&state, payload).instrument(span).await;

    state
        .metrics
        .record_request(start.elapsed().as_millis() as u64, result.is_ok())
        .await;
    result
}

async fn run_feedback(
    state: &AppState,
    payload: Result<Json<FeedbackBody>, JsonRejection>,
) -> Result<Json<FeedbackReply>, ApiError> {
    let Json(body) = payload.map_err(|rejection| {
        tracing::warn!(error = %rejection.body_text(), "Rejected feedback body");
        rejection_response(&rejection)
    })?;

    state
        .chat
        .feedback(
            &body.session_id,
            body.kind,
            body.message_index,
            body.text.as_deref().unwrap_or_default(),
        )
        .await
        .map_err(|e| {
            if !e.is_not_found() {
                tracing::error!(error = %e, "Feedback failed");
            }
            error_response(&e, None)
        })?;

    Ok(Json(FeedbackReply {
        status: "success".into(),
    }))
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let summary = state.metrics.summary().await;
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: "finbot-gateway".into(),
        sessions: state.chat.store().len().await,
        requests: summary.request_count,
        errors: summary.error_count,
        avg_duration_ms: summary.avg_duration_ms,
    })
}
