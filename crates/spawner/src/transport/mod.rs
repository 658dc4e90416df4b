// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the hub: login callback and the admin API.

pub mod auth;
pub mod http;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::HubState;

/// Build the axum `Router` with all hub routes.
pub fn build_router(state: Arc<HubState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Browser login flow (no auth)
        .route("/oauth/login", get(http::oauth_login))
        .route("/oauth/callback", get(http::oauth_callback))
        // Spawner management
        .route("/api/v1/users", get(http::list_users))
        .route("/api/v1/users/{user}/start", post(http::start_server))
        .route("/api/v1/users/{user}/status", get(http::server_status))
        .route("/api/v1/users/{user}/server", delete(http::stop_server))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
