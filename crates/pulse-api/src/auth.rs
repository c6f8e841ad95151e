use std::sync::Arc;

use axum::{Json, extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse};
use tracing::info;

use pulse_db::SqliteStore;
use pulse_sync::{Directory, Feed, IdentityResolver, SeenTracker, SocialGraph, StreamHub, decode_claims};
use pulse_types::api::RegisterRequest;

use crate::error::ApiResult;
use crate::middleware::bearer_token;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub store: SqliteStore,
    pub hub: StreamHub<SqliteStore>,
}

impl AppStateInner {
    pub fn new(store: SqliteStore) -> AppState {
        Arc::new(Self {
            hub: StreamHub::new(store.clone()),
            store,
        })
    }

    pub fn resolver(&self) -> IdentityResolver<SqliteStore> {
        IdentityResolver::new(self.store.clone())
    }

    pub fn directory(&self) -> Directory<SqliteStore> {
        Directory::new(self.store.clone())
    }

    pub fn graph(&self) -> SocialGraph<SqliteStore> {
        SocialGraph::new(self.store.clone())
    }

    pub fn feed(&self) -> Feed<SqliteStore> {
        Feed::new(self.store.clone())
    }

    pub fn seen(&self) -> SeenTracker<SqliteStore> {
        SeenTracker::new(self.store.clone())
    }
}

/// Provision the user record for the bearer token's subject. The token was
/// issued by the auth provider; no session exists until this succeeds.
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let claims = decode_claims(bearer_token(&headers)?)?;
    let user = state.directory().register(&claims, &req.username, &req.image).await?;
    info!("Registered {} for subject {}", user.username, user.id);
    Ok((StatusCode::CREATED, Json(user)))
}
