//! REST surface over the sync layer.

pub mod auth;
pub mod error;
pub mod friends;
pub mod messages;
pub mod middleware;
pub mod posts;
pub mod routes;
pub mod users;

pub use auth::{AppState, AppStateInner};
pub use error::{ApiError, ApiResult};
pub use routes::router;
