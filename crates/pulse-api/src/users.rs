use axum::{Extension, Json, extract::State, response::IntoResponse};

use pulse_sync::{ProfileChanges, Session};
use pulse_types::api::UpdateProfileRequest;

use crate::auth::AppState;
use crate::error::ApiResult;

pub async fn list_users(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.directory().list_users().await?))
}

pub async fn me(State(state): State<AppState>, Extension(session): Extension<Session>) -> ApiResult<impl IntoResponse> {
    let actor = session.actor()?;
    Ok(Json(state.directory().fetch_user(&actor.key).await?))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    let changes = ProfileChanges {
        username: req.username,
        image: req.image,
    };
    Ok(Json(state.directory().update_profile(&session, changes).await?))
}
