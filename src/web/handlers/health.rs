//! Health check endpoint.

use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::web::state::SharedState;

pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "ok",
        "cached_profiles": state.rapport.profiles.cache().len(),
        "ws_connections": state.ws_connection_count.load(Ordering::Relaxed),
        "subscribers": state.notifier.subscriber_count(),
    });
    (StatusCode::OK, axum::Json(body))
}
