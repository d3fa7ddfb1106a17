//! HTTP ingress.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use qr_core::{now_iso8601, Publisher, StageMessage};

#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<dyn Publisher>,
    pub max_iterations: u32,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/query", post(submit_query))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Seed a research chain. The body is the topic as plain text.
async fn submit_query(State(state): State<AppState>, body: String) -> (StatusCode, String) {
    let topic = body.trim();
    if topic.is_empty() {
        return (StatusCode::BAD_REQUEST, "Topic must not be empty".to_string());
    }

    let seed = StageMessage::seed(topic, state.max_iterations, now_iso8601());
    match state.publisher.publish(seed).await {
        Ok(()) => {
            info!(topic, budget = state.max_iterations, "Research chain submitted");
            (StatusCode::OK, "Query submitted".to_string())
        }
        Err(e) => {
            error!(topic, error = %e, "Failed to submit research chain");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Failed to submit query".to_string(),
            )
        }
    }
}

async fn health() -> &'static str {
    "ok"
}
