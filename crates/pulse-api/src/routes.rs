use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::auth::{self, AppState};
use crate::middleware::require_session;
use crate::{friends, messages, posts, users};

/// Every REST route. Everything except registration requires a session.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/users", post(auth::register))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/users", get(users::list_users))
        .route("/me", get(users::me).patch(users::update_me))
        .route("/users/{key}/friends", get(friends::list_friends).post(friends::add_friend))
        .route("/rooms/{peer_id}/messages", get(messages::get_messages).post(messages::send_message))
        .route("/rooms/{peer_id}/messages/{message_id}/seen", post(messages::mark_seen))
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route("/posts/{post_id}/reactions", post(posts::react))
        .layer(middleware::from_fn_with_state(state.clone(), require_session))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}
