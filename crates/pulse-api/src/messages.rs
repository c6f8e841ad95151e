use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use pulse_sync::stream::{load_messages, send_message as append_message};
use pulse_sync::{RoomId, Session};
use pulse_types::api::{CreatedResponse, OutcomeResponse, SendMessageRequest};

use crate::auth::AppState;
use crate::error::ApiResult;

/// Conversation between the acting user and `peer_id`, in store order.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
    Extension(session): Extension<Session>,
) -> ApiResult<impl IntoResponse> {
    let actor = session.actor()?;
    let room = RoomId::derive(&actor.id, &peer_id)?;
    Ok(Json(load_messages(&state.store, &room).await?))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
    Extension(session): Extension<Session>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let (_, id) = append_message(&state.store, &session, &peer_id, &req.text).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

pub async fn mark_seen(
    State(state): State<AppState>,
    Path((peer_id, message_id)): Path<(String, String)>,
    Extension(session): Extension<Session>,
) -> ApiResult<impl IntoResponse> {
    let actor = session.actor()?;
    let room = RoomId::derive(&actor.id, &peer_id)?;
    let outcome = state.seen().mark_seen(&session, &room, &message_id).await?;
    Ok(Json(OutcomeResponse { outcome }))
}
