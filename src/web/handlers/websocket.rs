//! WebSocket upgrade and notification forwarding.

use std::sync::atomic::Ordering;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::web::config::MAX_WS_CONNECTIONS;
use crate::web::state::SharedState;
use crate::web::utils::api_error;

#[derive(Deserialize)]
pub struct WsQuery {
    profile_id: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    Query(query): Query<WsQuery>,
) -> Response {
    if query.profile_id.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "profile_id cannot be empty");
    }

    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= MAX_WS_CONNECTIONS {
        return api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!(
                "too many WebSocket connections (max {})",
                MAX_WS_CONNECTIONS
            ),
        );
    }

    let profile_id = query.profile_id.trim().to_string();
    ws.on_upgrade(move |socket| ws_connection(socket, state, profile_id))
        .into_response()
}

async fn ws_connection(mut socket: WebSocket, state: SharedState, profile_id: String) {
    let ws_count = state.ws_connection_count.clone();
    ws_count.fetch_add(1, Ordering::Relaxed);
    let mut rx = state.notifier.subscribe();
    crate::rlog!("ws: {} connected", crate::logging::profile_id(&profile_id));

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(addressed) if addressed.target_id == profile_id => {
                        if let Ok(json) = serde_json::to_string(&addressed.notification) {
                            if socket.send(WsMessage::Text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        crate::rlog!("ws client lagged, skipped {n} events");
                        let lag_msg = serde_json::json!({
                            "type": "EVENTS_MISSED",
                            "count": n,
                        });
                        if let Ok(json) = serde_json::to_string(&lag_msg) {
                            if socket.send(WsMessage::Text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = socket.send(WsMessage::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    ws_count.fetch_sub(1, Ordering::Relaxed);
    crate::rlog!("ws: {} disconnected", crate::logging::profile_id(&profile_id));
}
