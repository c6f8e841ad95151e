use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use pulse_sync::{PostDraft, Session};
use pulse_types::api::{CreatedResponse, NewPostRequest, OutcomeResponse, ReactRequest};
use pulse_types::models::Post;

use crate::auth::AppState;
use crate::error::ApiResult;

/// Newest first.
pub async fn list_posts(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let snapshot = state.feed().load().await?;
    let posts: Vec<Post> = snapshot.newest_first().cloned().collect();
    Ok(Json(posts))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<NewPostRequest>,
) -> ApiResult<impl IntoResponse> {
    let draft = PostDraft {
        title: req.title,
        content: req.content,
        image: req.image,
    };
    let id = state.feed().publish(&session, draft).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

pub async fn react(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(session): Extension<Session>,
    Json(req): Json<ReactRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.feed().react(&session, &post_id, req.verdict).await?;
    Ok(Json(OutcomeResponse { outcome }))
}
