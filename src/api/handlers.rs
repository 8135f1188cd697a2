//! HTTP request handlers

use super::types::{InboundEvent, InboundResponse, WebhookRequest};
use super::AppState;
use crate::notify::Notification;
use crate::runtime::{InteractionOutcome, MessageOutcome};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Notifications from external systems
        .route("/webhook", post(webhook))
        .route("/notify", post(webhook))
        // Chat events relayed from the gateway
        .route("/api/inbound", post(inbound))
        .route("/health", get(health))
        .with_state(state)
}

// ============================================================
// Webhook
// ============================================================

async fn webhook(State(state): State<AppState>, body: Bytes) -> Result<&'static str, AppError> {
    let request: WebhookRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::info!(error = %e, "Rejected webhook body");
        AppError::Invalid
    })?;

    let content = request
        .content
        .filter(|c| !c.is_empty())
        .ok_or(AppError::Invalid)?;
    let link_url = request.sheet_url.filter(|u| !u.is_empty());

    state
        .notifications
        .deliver(Notification { content, link_url })
        .await
        .map_err(|e| AppError::Unavailable(e.to_string()))?;

    Ok("OK")
}

// ============================================================
// Inbound Chat Bridge
// ============================================================

async fn inbound(
    State(state): State<AppState>,
    Json(event): Json<InboundEvent>,
) -> (StatusCode, Json<InboundResponse>) {
    let handled = match event {
        InboundEvent::Message(message) => {
            !matches!(state.manager.handle_message(message).await, MessageOutcome::PassThrough)
        }
        InboundEvent::Interaction(interaction) => !matches!(
            state.manager.handle_interaction(interaction).await,
            InteractionOutcome::Ignored
        ),
    };
    (StatusCode::ACCEPTED, Json(InboundResponse { handled }))
}

async fn health() -> &'static str {
    "OK"
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    Invalid,
    Unavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Invalid => (StatusCode::BAD_REQUEST, "Invalid").into_response(),
            AppError::Unavailable(msg) => {
                tracing::error!(error = %msg, "Webhook not dispatched");
                (StatusCode::SERVICE_UNAVAILABLE, msg).into_response()
            }
        }
    }
}
