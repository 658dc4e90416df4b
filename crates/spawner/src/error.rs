// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::EngineError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced by the OAuth client, the provisioner and the spawner.
///
/// Upstream variants keep the HTTP status (when one was received) and the
/// response body so operators can see what the provisioning service said.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("token exchange failed: {}", upstream(.status, .body))]
    TokenExchange { status: Option<u16>, body: String },

    #[error("token refresh failed for {user}: {reason}")]
    TokenRefresh { user: String, reason: String },

    #[error("profile fetch failed for {user}: {reason}")]
    ProfileFetch { user: String, reason: String },

    #[error("create of cluster {user}/{cluster} failed: {}", upstream(.status, .body))]
    ClusterCreate { user: String, cluster: String, status: Option<u16>, body: String },

    #[error("credential download for {user}/{cluster} failed: {}", upstream(.status, .body))]
    CredentialDownload { user: String, cluster: String, status: Option<u16>, body: String },

    #[error("cluster {user}/{cluster} still not active after {waited:?}")]
    CredentialTimeout { user: String, cluster: String, waited: Duration },

    #[error("credential download for {user}/{cluster} cancelled")]
    Cancelled { user: String, cluster: String },

    #[error("cluster credentials not found in {}: missing {missing}", .dir.display())]
    CredentialsNotFound { dir: PathBuf, missing: String },

    #[error("lookup of container {id} failed: {source}")]
    ContainerLookup { id: String, source: EngineError },

    #[error("pull of image {image} failed: {source}")]
    ImagePull { image: String, source: EngineError },

    #[error("container start for {user} failed: {source}")]
    ContainerStart { user: String, source: EngineError },

    #[error("stop of container {id} failed: {source}")]
    ContainerStop { id: String, source: EngineError },

    #[error("engine connection for {user} failed: {source}")]
    EngineConnect { user: String, source: EngineError },

    #[error("user {0} is not allowed to sign in")]
    Unauthorized(String),

    #[error("state persistence failed: {0}")]
    Persist(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn upstream(status: &Option<u16>, body: &str) -> String {
    match status {
        Some(code) => format!("({code}) {body}"),
        None => body.to_owned(),
    }
}

/// Error codes for the adapter API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiError {
    Unauthorized,
    BadRequest,
    UserNotFound,
    UpstreamError,
    Internal,
}

impl ApiError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::UserNotFound => 404,
            Self::UpstreamError => 502,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl From<&Error> for ApiError {
    fn from(err: &Error) -> Self {
        match err {
            Error::Unauthorized(_) => Self::Unauthorized,
            Error::TokenExchange { .. }
            | Error::TokenRefresh { .. }
            | Error::ProfileFetch { .. }
            | Error::ClusterCreate { .. }
            | Error::CredentialDownload { .. }
            | Error::CredentialTimeout { .. }
            | Error::ContainerLookup { .. }
            | Error::ImagePull { .. }
            | Error::ContainerStart { .. }
            | Error::ContainerStop { .. }
            | Error::EngineConnect { .. } => Self::UpstreamError,
            Error::Cancelled { .. }
            | Error::CredentialsNotFound { .. }
            | Error::Persist(_)
            | Error::Io(_) => Self::Internal,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
