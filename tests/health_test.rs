// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! End-to-end smoke test for the assembled router: `/healthz` over the
//! real `tower::Service` implementation axum produces, with every
//! component wired exactly as `stationd`'s `run()` wires them.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use core_config::McpManifest;
use core_gateway::{build_router, AppState};
use core_mcp::McpClient;
use core_model::mock::MockModelProvider;

#[tokio::test]
async fn healthz_reports_ready_once_every_component_is_wired() {
    let model = Arc::new(MockModelProvider);
    let mcp = Arc::new(McpClient::spawn_all(&McpManifest::default()).await);
    let state = AppState::new(model, mcp, "/bin/sh".into(), 4, true, Duration::from_secs(30));

    let router = build_router(state);

    let response = router
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["ready"], true);
    assert_eq!(json["model"], true);
    assert_eq!(json["browser"], true);
}

#[tokio::test]
async fn unknown_route_is_a_404() {
    let model = Arc::new(MockModelProvider);
    let mcp = Arc::new(McpClient::spawn_all(&McpManifest::default()).await);
    let state = AppState::new(model, mcp, "/bin/sh".into(), 4, true, Duration::from_secs(30));

    let router = build_router(state);
    let response = router
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
