//! Shared utility functions for the HTTP handlers.

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::GraphError;
use crate::service::Rapport;
use crate::web::config::PROFILE_HEADER;
use crate::web::state::SharedState;

/// Build a standard JSON error response.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, axum::Json(body)).into_response()
}

pub fn status_for(e: &GraphError) -> StatusCode {
    match e {
        GraphError::NotFound(_) => StatusCode::NOT_FOUND,
        GraphError::Conflict(_) => StatusCode::CONFLICT,
        GraphError::Unauthorized(_) => StatusCode::FORBIDDEN,
        GraphError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        GraphError::PartialFailure { .. } => StatusCode::SERVICE_UNAVAILABLE,
        GraphError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(e: &GraphError) -> Response {
    api_error(status_for(e), e.to_string())
}

/// Profile id of the caller, taken from the session header.
pub fn caller_id(headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get(PROFILE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            api_error(
                StatusCode::UNAUTHORIZED,
                format!("missing {PROFILE_HEADER} header"),
            )
        })
}

/// Run a service call on the blocking pool; the service takes locks and
/// talks to SQLite synchronously.
pub async fn call<T, F>(state: &SharedState, f: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce(&Rapport) -> Result<T, GraphError> + Send + 'static,
{
    let state = Arc::clone(state);
    match tokio::task::spawn_blocking(move || f(&state.rapport)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(error_response(&e)),
        Err(e) => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("request task failed: {e}"),
        )),
    }
}

pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Response {
    (status, axum::Json(value)).into_response()
}

/// Handlers return the error side already rendered.
pub type ApiResult = Result<Response, Response>;
