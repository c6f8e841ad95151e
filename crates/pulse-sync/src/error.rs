use pulse_db::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

/// Failures of the sync layer. Idempotent no-ops are not errors; they are
/// reported through the outcome enums of each component.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("malformed session token: {0}")]
    MalformedToken(String),

    #[error("no user provisioned for subject {0}")]
    UserNotFound(String),

    #[error("a conversation needs two distinct, non-empty participants")]
    InvalidParticipants,

    #[error("message text is empty")]
    EmptyMessage,

    #[error("post title and content are required")]
    EmptyPost,

    #[error("username must be one or more letters")]
    InvalidUsername,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("session has no resolved acting user")]
    MissingActor,

    #[error("session has been revoked")]
    SessionRevoked,

    #[error("only the receiver of a message may acknowledge it")]
    NotRecipient,

    #[error("record at {path} is malformed: {reason}")]
    InvalidRecord { path: String, reason: String },

    #[error("transient store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            // A key that cannot be a path cannot name an existing record
            StoreError::InvalidPath(path) => Self::NotFound(path),
            other => Self::Store(other),
        }
    }
}
