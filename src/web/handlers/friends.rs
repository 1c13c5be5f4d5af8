//! Friendship handlers. Every route acts on the caller's own edges.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use serde::Deserialize;

use crate::friendship::EdgePatch;
use crate::model::RelationshipStatus;
use crate::transition::FriendOp;
use crate::web::state::SharedState;
use crate::web::utils::{api_error, call, caller_id, json, ApiResult};

#[derive(Deserialize)]
pub struct SendFriendRequestPayload {
    friend_id: Option<String>,
    phone: Option<String>,
}

#[derive(Deserialize)]
pub struct FriendPayload {
    friend_id: String,
}

#[derive(Deserialize)]
pub struct ListFriendsQuery {
    status: Option<String>,
}

pub async fn list_friends_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<ListFriendsQuery>,
) -> ApiResult {
    let me = caller_id(&headers)?;
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(s) => Some(
            s.parse::<RelationshipStatus>()
                .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?,
        ),
    };
    let edges = call(&state, move |r| r.friendships.list_edges(&me, status)).await?;
    Ok(json(StatusCode::OK, &edges))
}

pub async fn send_friend_request_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<SendFriendRequestPayload>,
) -> ApiResult {
    let me = caller_id(&headers)?;
    let friend_id = req.friend_id.filter(|s| !s.trim().is_empty());
    let phone = req.phone.filter(|s| !s.trim().is_empty());

    let edge = match (friend_id, phone) {
        (Some(id), _) => {
            call(&state, move |r| r.friendships.send_request(&me, id.trim())).await?
        }
        (None, Some(phone)) => {
            call(&state, move |r| r.friendships.send_request_by_phone(&me, &phone)).await?
        }
        (None, None) => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "friend_id or phone is required",
            ))
        }
    };
    Ok(json(StatusCode::CREATED, &edge))
}

async fn run_op(
    state: &SharedState,
    headers: &HeaderMap,
    op: FriendOp,
    friend_id: String,
) -> ApiResult {
    let me = caller_id(headers)?;
    if friend_id.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "friend_id cannot be empty"));
    }
    let edge = call(state, move |r| r.friendships.apply(op, &me, friend_id.trim())).await?;
    Ok(json(StatusCode::OK, &edge))
}

pub async fn accept_friend_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<FriendPayload>,
) -> ApiResult {
    run_op(&state, &headers, FriendOp::AcceptRequest, req.friend_id).await
}

pub async fn decline_friend_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<FriendPayload>,
) -> ApiResult {
    run_op(&state, &headers, FriendOp::DeclineRequest, req.friend_id).await
}

pub async fn block_friend_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<FriendPayload>,
) -> ApiResult {
    run_op(&state, &headers, FriendOp::Block, req.friend_id).await
}

pub async fn unblock_friend_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<FriendPayload>,
) -> ApiResult {
    run_op(&state, &headers, FriendOp::Unblock, req.friend_id).await
}

pub async fn remove_friend_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(friend_id): Path<String>,
) -> ApiResult {
    run_op(&state, &headers, FriendOp::RemoveFriend, friend_id).await
}

pub async fn update_friend_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(friend_id): Path<String>,
    axum::Json(patch): axum::Json<EdgePatch>,
) -> ApiResult {
    let me = caller_id(&headers)?;
    let edge = call(&state, move |r| r.friendships.update_edge(&me, &friend_id, patch)).await?;
    Ok(json(StatusCode::OK, &edge))
}
