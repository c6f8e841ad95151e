use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, warn};

use pulse_sync::SyncError;

pub type ApiResult<T> = Result<T, ApiError>;

/// A sync failure on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub SyncError);

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            SyncError::MalformedToken(_) | SyncError::MissingActor | SyncError::SessionRevoked => {
                StatusCode::UNAUTHORIZED
            }
            SyncError::UserNotFound(_) | SyncError::NotRecipient => StatusCode::FORBIDDEN,
            SyncError::NotFound(_) => StatusCode::NOT_FOUND,
            SyncError::InvalidParticipants
            | SyncError::EmptyMessage
            | SyncError::EmptyPost
            | SyncError::InvalidUsername => StatusCode::BAD_REQUEST,
            SyncError::InvalidRecord { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            SyncError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self.0);
        } else {
            warn!("Rejected request: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
