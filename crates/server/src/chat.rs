//! Chat transport.
//!
//! - `POST /chat` (also `/chat/`) with `{message, session_id?, user_id?, company_id?}`
//!   and an optional `?session_id=` used only when the body carries none.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use tracechat_agent::{ConversationOrchestrator, NextAction, TurnRequest};
use tracechat_core::{DomainError, InterfaceError};

#[derive(Clone)]
pub struct ChatState {
    orchestrator: Arc<ConversationOrchestrator>,
}

impl ChatState {
    pub fn new(orchestrator: Arc<ConversationOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub company_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatQuery {
    pub session_id: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<NextAction>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatError {
    pub detail: String,
    pub correlation_id: String,
}

pub fn router(orchestrator: Arc<ConversationOrchestrator>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat/", post(chat))
        .with_state(ChatState::new(orchestrator))
}

pub async fn chat(
    State(state): State<ChatState>,
    Query(query): Query<ChatQuery>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ChatError>)> {
    let correlation_id = Uuid::new_v4().to_string();

    let message = body.message.trim();
    if message.is_empty() {
        let error = tracechat_core::ApplicationError::from(DomainError::EmptyMessage)
            .into_interface(correlation_id);
        return Err(error_response(error));
    }

    let request = TurnRequest {
        message: message.to_string(),
        session_id: non_blank(body.session_id).or_else(|| non_blank(query.session_id)),
        user_id: non_blank(body.user_id),
        company_id: non_blank(body.company_id),
    };

    let outcome = state
        .orchestrator
        .handle_turn(request)
        .await
        .map_err(|error| error_response(error.into_interface(correlation_id.clone())))?;

    info!(
        event_name = "chat.http.replied",
        correlation_id = %correlation_id,
        session_id = %outcome.session_id,
        intent = %outcome.intent,
        "chat reply sent"
    );

    Ok(Json(ChatResponse {
        response: outcome.reply,
        session_id: outcome.session_id.0,
        next_action: outcome.next_action,
    }))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn error_response(error: InterfaceError) -> (StatusCode, Json<ChatError>) {
    let status = match &error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(
        event_name = "chat.http.failed",
        correlation_id = %error.correlation_id(),
        status = status.as_u16(),
        error = %error,
        "chat request failed"
    );
    (
        status,
        Json(ChatError {
            detail: error.user_message().to_string(),
            correlation_id: error.correlation_id().to_string(),
        }),
    )
}
