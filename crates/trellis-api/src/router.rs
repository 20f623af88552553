use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{channels, messages, users};

/// All HTTP routes. Everything except registration and login requires a
/// bearer token.
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/channels", get(channels::list_channels).post(channels::create_channel))
        .route(
            "/channels/{channel_id}",
            get(channels::get_channel).delete(channels::delete_channel),
        )
        .route("/channels/{channel_id}/members", get(channels::list_members))
        .route("/channels/{channel_id}/privacy", put(channels::update_privacy))
        .route(
            "/channels/{channel_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/dms", post(channels::open_dm))
        .route("/users/{user_id}/role", put(users::set_role))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
