mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use hellohere_api::{AppState, AppStateInner};
use hellohere_db::{Database, MemoryStore, Store};
use hellohere_gateway::auth::{JwtVerifier, TokenVerifier};
use hellohere_gateway::transport::LocalTransport;
use hellohere_gateway::{ChatService, Dispatcher, connection, scheduler};

use crate::config::Config;

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    transport: LocalTransport,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
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
                .unwrap_or_else(|_| "hellohere=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init store
    let store: Arc<dyn Store> = if config.db_path == ":memory:" {
        warn!("Running on the in-memory store; nothing will be persisted");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(Database::open(&PathBuf::from(&config.db_path))?)
    };

    // Shared state
    let transport = LocalTransport::new();
    let verifier: Arc<dyn TokenVerifier> = Arc::new(JwtVerifier::new(&config.jwt_secret));
    let chat = Arc::new(ChatService::new(
        store,
        Arc::new(transport.clone()),
        config.gateway.clone(),
    ));
    let dispatcher = Dispatcher::new(chat.clone(), verifier.clone());
    let app_state: AppState = Arc::new(AppStateInner {
        chat: chat.clone(),
        verifier,
    });

    scheduler::spawn_location_pings(chat, config.gateway.location_ping_interval);

    // Routes
    let ws_route = Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(ServerState {
            dispatcher,
            transport,
        });

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(hellohere_api::router(app_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("hellohere server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        return std::future::pending().await;
    }
    info!("Shutting down");
}

/// `$connect`: the token rides in the query string and is checked before
/// the upgrade, so a bad token never opens a socket.
async fn ws_upgrade(
    State(state): State<ServerState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let identity = match state.dispatcher.authenticate(query.token.as_deref()) {
        Ok(identity) => identity,
        Err(e) => return (StatusCode::UNAUTHORIZED, e.reason()).into_response(),
    };

    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.transport, identity)
    })
}
