// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the showcase service.

pub mod auth;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum `Router` with all showcase routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Tenant credentials
        .route("/api/v1/tenants", get(http::list_tenants))
        .route("/api/v1/tenants/{tenant}/token", post(http::seed_token))
        // Publication
        .route("/api/v1/tenants/{tenant}/credentials/publish", post(http::publish_credential))
        .route(
            "/api/v1/tenants/{tenant}/showcases/{showcase}/publish",
            post(http::publish_showcase),
        )
        .route("/api/v1/tenants/{tenant}/jobs", get(http::list_jobs))
        .route("/api/v1/tenants/{tenant}/jobs/reset", post(http::reset_jobs))
        // Relay
        .route("/api/v1/connections/{connection_id}/events", post(http::relay_event))
        .route("/webhooks/topic/{topic}", post(http::webhook))
        .route("/ws", get(ws::ws_handler))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
