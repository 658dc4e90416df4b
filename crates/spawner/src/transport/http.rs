// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the hub.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ApiError, Error};
use crate::spawner::{
    is_valid_username, PollStatus, ServerLocation, SpawnPhase, SpawnerStateMachine,
};
use crate::state::HubState;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub session_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserInfo {
    pub user: String,
    pub phase: SpawnPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<ServerLocation>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub user: String,
    pub phase: SpawnPhase,
    pub status: PollStatus,
    /// Human-readable status, e.g. the exit summary of a stopped container.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<ServerLocation>,
}

fn user_info(machine: &SpawnerStateMachine) -> UserInfo {
    UserInfo {
        user: machine.user().to_owned(),
        phase: machine.phase(),
        container_id: machine.container_id(),
        location: machine.location(),
    }
}

fn error_response(err: &Error) -> Response {
    ApiError::from(err).to_http_response(err.to_string()).into_response()
}

/// Resolve a path user to its spawner or an error response.
async fn lookup(s: &HubState, user: &str) -> Result<Arc<SpawnerStateMachine>, Response> {
    if !is_valid_username(user) {
        return Err(ApiError::BadRequest.to_http_response("invalid username").into_response());
    }
    s.session(user).await.ok_or_else(|| {
        ApiError::UserNotFound.to_http_response(format!("no session for {user}")).into_response()
    })
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    let sessions = s.sessions.read().await;
    Json(HealthResponse { status: "running".to_owned(), session_count: sessions.len() })
}

/// `GET /oauth/login` — send the browser to the provider.
pub async fn oauth_login(
    State(s): State<Arc<HubState>>,
    Query(query): Query<LoginQuery>,
) -> impl IntoResponse {
    Redirect::to(&s.authenticator.settings().authorize_url(query.state.as_deref()))
}

/// `GET /oauth/callback?code=` — sign the user in and start their server.
pub async fn oauth_callback(
    State(s): State<Arc<HubState>>,
    Query(query): Query<CallbackQuery>,
) -> impl IntoResponse {
    if let Some(error) = query.error {
        return ApiError::Unauthorized.to_http_response(format!("login denied: {error}")).into_response();
    }
    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return ApiError::BadRequest
            .to_http_response("oauth callback made without a token")
            .into_response();
    };

    let login = match s.authenticator.authenticate(&code).await {
        Ok(login) => login,
        Err(e) => {
            warn!(err = %e, "login failed");
            return error_response(&e);
        }
    };
    if !is_valid_username(&login.username) {
        return ApiError::BadRequest
            .to_http_response(format!("unsupported username {:?}", login.username))
            .into_response();
    }

    let machine = s.sign_in(login.client).await;
    s.persist(&machine);
    if !machine.is_starting() {
        s.spawn_start(Arc::clone(&machine));
    }
    (StatusCode::ACCEPTED, Json(user_info(&machine))).into_response()
}

/// `GET /api/v1/users`
pub async fn list_users(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    let sessions = s.sessions.read().await;
    let mut users: Vec<UserInfo> = sessions.values().map(|m| user_info(m)).collect();
    users.sort_by(|a, b| a.user.cmp(&b.user));
    Json(users)
}

/// `POST /api/v1/users/{user}/start`
pub async fn start_server(
    State(s): State<Arc<HubState>>,
    Path(user): Path<String>,
) -> impl IntoResponse {
    let machine = match lookup(&s, &user).await {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    if !machine.is_starting() {
        s.spawn_start(Arc::clone(&machine));
    }
    (StatusCode::ACCEPTED, Json(user_info(&machine))).into_response()
}

/// `GET /api/v1/users/{user}/status`
pub async fn server_status(
    State(s): State<Arc<HubState>>,
    Path(user): Path<String>,
) -> impl IntoResponse {
    let machine = match lookup(&s, &user).await {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let had_container = machine.container_id().is_some();
    match machine.poll().await {
        Ok(status) => {
            if had_container && machine.container_id().is_none() {
                s.persist(&machine);
            }
            Json(StatusResponse {
                user,
                phase: machine.phase(),
                message: status.to_string(),
                status,
                location: machine.location(),
            })
            .into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// `DELETE /api/v1/users/{user}/server` — stop the container and forget it.
pub async fn stop_server(
    State(s): State<Arc<HubState>>,
    Path(user): Path<String>,
) -> impl IntoResponse {
    let machine = match lookup(&s, &user).await {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    if let Err(e) = machine.stop().await {
        return error_response(&e);
    }
    machine.clear_state();
    s.persist(&machine);
    Json(user_info(&machine)).into_response()
}
