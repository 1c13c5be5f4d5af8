//! Profile directory handlers.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};

use crate::model::Profile;
use crate::profiles::{NewProfile, ProfilePatch};
use crate::web::state::SharedState;
use crate::web::utils::{call, caller_id, json, ApiResult};

/// Fields other profiles may see. Edges and chat memberships stay private.
fn public_view(p: &Profile) -> serde_json::Value {
    serde_json::json!({
        "id": p.id,
        "first_name": p.first_name,
        "last_name": p.last_name,
        "bio": p.bio,
        "avatar": p.avatar,
        "cover_image": p.cover_image,
    })
}

pub async fn create_profile_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<NewProfile>,
) -> ApiResult {
    let profile = call(&state, move |r| r.profiles.create(req)).await?;
    Ok(json(StatusCode::CREATED, &profile))
}

pub async fn get_profile_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult {
    let profile = call(&state, move |r| r.profiles.get(&id)).await?;
    Ok(json(StatusCode::OK, &public_view(&profile)))
}

/// Resolve the profile owned by an identity of the external credential service.
pub async fn get_profile_by_user_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> ApiResult {
    let profile = call(&state, move |r| r.profiles.find_by_user(&user_id)).await?;
    Ok(json(StatusCode::OK, &public_view(&profile)))
}

pub async fn get_own_profile_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult {
    let me = caller_id(&headers)?;
    let profile = call(&state, move |r| r.profiles.get(&me)).await?;
    Ok(json(StatusCode::OK, &profile))
}

pub async fn update_own_profile_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(patch): axum::Json<ProfilePatch>,
) -> ApiResult {
    let me = caller_id(&headers)?;
    let profile = call(&state, move |r| r.profiles.update(&me, patch)).await?;
    Ok(json(StatusCode::OK, &profile))
}
