//! Chat list of the caller.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::web::state::SharedState;
use crate::web::utils::{call, caller_id, json, ApiResult};

pub async fn list_chats_handler(State(state): State<SharedState>, headers: HeaderMap) -> ApiResult {
    let me = caller_id(&headers)?;
    let rooms = call(&state, move |r| r.profiles.list_chats(&me)).await?;
    Ok(json(StatusCode::OK, &rooms))
}
