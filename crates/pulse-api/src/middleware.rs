use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use pulse_sync::{Session, SyncError};

use crate::auth::AppState;
use crate::error::ApiResult;

/// Token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, SyncError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| SyncError::MalformedToken("missing bearer token".into()))
}

/// Validate the bearer token into a [`Session`] and hand it to the handler.
pub async fn require_session(State(state): State<AppState>, mut req: Request, next: Next) -> ApiResult<Response> {
    let mut session = Session::issued(bearer_token(req.headers())?);
    let actor = state.resolver().validate(&mut session).await?;
    debug!("{} {} as {}", req.method(), req.uri().path(), actor.key);

    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}
