use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use pulse_sync::Session;
use pulse_types::api::OutcomeResponse;

use crate::auth::AppState;
use crate::error::ApiResult;

pub async fn list_friends(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.graph().list_friends(&key).await?))
}

/// Put the acting user into `key`'s friend set.
pub async fn add_friend(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Extension(session): Extension<Session>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.graph().add_friend(&session, &key).await?;
    Ok(Json(OutcomeResponse { outcome }))
}
