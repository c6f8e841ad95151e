use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use pulse_api::{ApiError, AppState, AppStateInner};
use pulse_db::SqliteStore;
use pulse_gateway::connection;
use pulse_sync::Session;

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    #[serde(default)]
    token: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulse=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("PULSE_DB_PATH").unwrap_or_else(|_| "pulse.db".into());
    let host = std::env::var("PULSE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PULSE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    let store = SqliteStore::open(&PathBuf::from(&db_path))?;
    info!("Store opened at {}", db_path);
    let state = AppStateInner::new(store);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    let app = Router::new()
        .merge(pulse_api::router(state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Pulse server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Browsers cannot set headers on a WebSocket handshake, so the session
/// token travels in the query string.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let mut session = Session::issued(query.token);
    let actor = match state.resolver().validate(&mut session).await {
        Ok(actor) => actor.clone(),
        Err(e) => return ApiError::from(e).into_response(),
    };

    let hub = state.hub.clone();
    let feed = state.feed();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, actor, hub, feed))
}
