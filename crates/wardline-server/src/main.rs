mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use wardline_api::middleware::verify_token;
use wardline_api::{AppState, AppStateInner};
use wardline_gateway::connection;

use crate::config::Config;

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wardline=debug,wardline_api=debug,wardline_chat=debug,wardline_gateway=debug,wardline_db=info,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e:#}");
            std::process::exit(1);
        }
    };

    let db = wardline_db::Database::open(&config.db_path)?;

    let state: AppState = Arc::new(AppStateInner {
        db: Arc::new(db),
        jwt_secret: config.jwt_secret.clone(),
    });

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    let app = Router::new()
        .merge(wardline_api::router(state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Wardline server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The token rides in the query string: browsers cannot set headers on a
/// WebSocket handshake.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let Some(claims) = query.token.as_deref().and_then(|t| verify_token(&state.jwt_secret, t)) else {
        warn!("Gateway upgrade rejected: missing or invalid token");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let db = state.db.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, db, claims))
}
