//! Group management handlers.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use serde::Deserialize;

use crate::groups::NewGroup;
use crate::web::state::SharedState;
use crate::web::utils::{call, caller_id, json, ApiResult};

#[derive(Deserialize)]
pub struct AddMembersRequest {
    member_ids: Vec<String>,
}

#[derive(Deserialize)]
pub struct TransferLeaderRequest {
    member_id: String,
}

pub async fn list_own_groups_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult {
    let me = caller_id(&headers)?;
    let groups = call(&state, move |r| r.groups.list_groups_for(&me)).await?;
    Ok(json(StatusCode::OK, &groups))
}

pub async fn create_group_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<NewGroup>,
) -> ApiResult {
    let me = caller_id(&headers)?;
    let group = call(&state, move |r| r.groups.create_group(&me, req)).await?;
    Ok(json(StatusCode::CREATED, &group))
}

pub async fn get_group_handler(
    State(state): State<SharedState>,
    Path(group_id): Path<String>,
) -> ApiResult {
    let group = call(&state, move |r| r.groups.get_group(&group_id)).await?;
    Ok(json(StatusCode::OK, &group))
}

pub async fn delete_group_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(group_id): Path<String>,
) -> ApiResult {
    let me = caller_id(&headers)?;
    call(&state, move |r| r.groups.delete_group(&group_id, &me)).await?;
    Ok(json(StatusCode::OK, &serde_json::json!({ "status": "deleted" })))
}

pub async fn add_members_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(group_id): Path<String>,
    axum::Json(req): axum::Json<AddMembersRequest>,
) -> ApiResult {
    let me = caller_id(&headers)?;
    let group = call(&state, move |r| {
        r.groups.add_members(&group_id, &me, &req.member_ids)
    })
    .await?;
    Ok(json(StatusCode::OK, &group))
}

pub async fn remove_member_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path((group_id, member_id)): Path<(String, String)>,
) -> ApiResult {
    let me = caller_id(&headers)?;
    let group = call(&state, move |r| {
        r.groups.remove_member(&group_id, &me, &member_id)
    })
    .await?;
    Ok(json(StatusCode::OK, &group))
}

pub async fn transfer_leader_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(group_id): Path<String>,
    axum::Json(req): axum::Json<TransferLeaderRequest>,
) -> ApiResult {
    let me = caller_id(&headers)?;
    let group = call(&state, move |r| {
        r.groups.transfer_leadership(&group_id, &me, &req.member_id)
    })
    .await?;
    Ok(json(StatusCode::OK, &group))
}
