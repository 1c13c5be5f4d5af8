//! Axum router construction.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::web::handlers;
use crate::web::state::SharedState;

/// Build the complete Axum router with all API routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health::health_handler))
        // Profiles API
        .route(
            "/api/profiles",
            post(handlers::profiles::create_profile_handler),
        )
        .route(
            "/api/profiles/:id",
            get(handlers::profiles::get_profile_handler),
        )
        .route(
            "/api/users/:user_id/profile",
            get(handlers::profiles::get_profile_by_user_handler),
        )
        .route(
            "/api/profile",
            get(handlers::profiles::get_own_profile_handler)
                .put(handlers::profiles::update_own_profile_handler),
        )
        // Friends API
        .route(
            "/api/profile/friends",
            get(handlers::friends::list_friends_handler)
                .post(handlers::friends::send_friend_request_handler),
        )
        .route(
            "/api/profile/friends/accept",
            post(handlers::friends::accept_friend_handler),
        )
        .route(
            "/api/profile/friends/decline",
            post(handlers::friends::decline_friend_handler),
        )
        .route(
            "/api/profile/friends/block",
            post(handlers::friends::block_friend_handler),
        )
        .route(
            "/api/profile/friends/unblock",
            post(handlers::friends::unblock_friend_handler),
        )
        .route(
            "/api/profile/friends/:friend_id",
            delete(handlers::friends::remove_friend_handler)
                .put(handlers::friends::update_friend_handler),
        )
        // Groups and chats of the caller
        .route(
            "/api/profile/groups",
            get(handlers::groups::list_own_groups_handler),
        )
        .route(
            "/api/profile/chats",
            get(handlers::chats::list_chats_handler),
        )
        // Groups API
        .route("/api/groups", post(handlers::groups::create_group_handler))
        .route(
            "/api/groups/:group_id",
            get(handlers::groups::get_group_handler).delete(handlers::groups::delete_group_handler),
        )
        .route(
            "/api/groups/:group_id/members",
            post(handlers::groups::add_members_handler),
        )
        .route(
            "/api/groups/:group_id/members/:member_id",
            delete(handlers::groups::remove_member_handler),
        )
        .route(
            "/api/groups/:group_id/leader",
            post(handlers::groups::transfer_leader_handler),
        )
        // WebSocket
        .route("/api/ws", get(handlers::websocket::ws_handler))
        .with_state(state)
}
