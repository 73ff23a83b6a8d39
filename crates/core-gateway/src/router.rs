// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Assembles the chat route, the structured route, and `/healthz` into one
//! axum `Router` and serves it. Each route carries its own state type, so
//! they are built as separate sub-routers and merged (spec §5).

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;

use crate::chat::{chat_ws_handler, ChatGateway};
use crate::error::GatewayError;
use crate::readiness::healthz;
use crate::state::AppState;
use crate::structured::{structured_ws_handler, StructuredGateway};

/// Upper bound on a single HTTP request body. WebSocket frames aren't
/// subject to this (the upgrade request itself has no body); it guards the
/// one plain HTTP route, `/healthz`, and any future non-socket route.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Build the full application router from shared component state.
pub fn build_router(state: AppState) -> Router {
    let chat_gateway = ChatGateway::new(state.clone());
    let structured_gateway = StructuredGateway::new(state.clone());

    let chat_router = Router::new()
        .route("/ws/chat", get(chat_ws_handler))
        .with_state(chat_gateway);

    let structured_router = Router::new()
        .route("/ws/structured", get(structured_ws_handler))
        .with_state(structured_gateway);

    let health_router = Router::new()
        .route("/healthz", get(healthz))
        .with_state(state.readiness.clone());

    Router::new()
        .merge(chat_router)
        .merge(structured_router)
        .merge(health_router)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
}

/// Bind `addr` and serve `router` until the process is asked to shut down.
/// Graceful shutdown (stop accepting connections, let in-flight requests
/// drain) is triggered by `shutdown_signal` resolving; component teardown
/// (browser contexts, shell sessions, tool providers) is the caller's
/// responsibility once this returns.
pub async fn serve(
    addr: &str,
    router: Router,
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), GatewayError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| GatewayError::Bind { addr: addr.to_string(), source })?;

    info!(%addr, "gateway listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(GatewayError::Serve)
}
