//! HTTP server assembly (spec §2a/§5/§6).
//!
//! A single `POST /` route carries the whole protocol, dispatched by the
//! `type` query parameter (spec §4.4); `GET /` serves a bare welcome page.
//! Graceful shutdown drains in-flight requests on SIGINT/SIGTERM without
//! holding any connection across a response flush (spec §5).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router, body::Bytes, http::HeaderMap};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Storage;
use crate::error::ApiErrorCode;
use crate::handlers::{self, AppState};
use crate::protocol::{self, ResponseEnvelope};

/// Builds the router and binds a listener, but does not yet serve
/// requests — callers drive `axum::serve` themselves so tests can bind to
/// an ephemeral port and inspect the bound address first.
pub fn build_router(storage: Storage, config: Arc<Config>) -> Router {
    let state = Arc::new(AppState { storage, config: config.clone() });

    Router::new()
        .route("/", get(welcome).post(api_handler))
        .layer(DefaultBodyLimit::max(config.server.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs the server until a shutdown signal (SIGINT/SIGTERM) is received,
/// draining in-flight requests per the configured shutdown timeout.
pub async fn serve(storage: Storage, config: Arc<Config>) -> std::io::Result<()> {
    let bind_addr: SocketAddr = format!("{}:{}", config.server.bind_host, config.server.bind_port)
        .parse()
        .expect("bind host/port already validated at config resolve time");
    let shutdown_timeout = config.server.shutdown_timeout_secs;

    let app = build_router(storage, config);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "sync server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_timeout))
        .await
}

async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!(timeout_secs, "shutdown signal received, draining in-flight requests");
}

async fn welcome() -> &'static str {
    "tucker-syncd: POST / with ?type=... to use the API\n"
}

async fn api_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    let envelope = match protocol::parse_request(&state.config.app_keys, &query, content_type, &body)
    {
        Ok(parsed) => handlers::handle(&state, parsed).await,
        Err(err) => ResponseEnvelope::error(ApiErrorCode::from(&err)),
    };

    (StatusCode::OK, Json(envelope))
}
