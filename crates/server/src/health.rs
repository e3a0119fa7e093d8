use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use tracechat_agent::{SessionStore, SharedModel};

#[derive(Clone)]
pub struct HealthState {
    model: Arc<SharedModel>,
    sessions: Arc<dyn SessionStore>,
}

impl HealthState {
    pub fn new(model: Arc<SharedModel>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { model, sessions }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub model: HealthCheck,
    pub model_loaded: bool,
    pub active_sessions: usize,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// The model loads lazily on the first turn that needs it, so an unloaded
/// model is reported but does not make the service unready.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let model_loaded = state.model.is_loaded();
    let model = if model_loaded {
        HealthCheck { status: "ready", detail: "language model runtime initialized".to_string() }
    } else {
        HealthCheck { status: "pending", detail: "language model loads on first use".to_string() }
    };

    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "tracechat-server runtime initialized".to_string(),
        },
        model,
        model_loaded,
        active_sessions: state.sessions.len().await,
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}
