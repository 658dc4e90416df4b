// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth against the cluster-provisioning service.
//!
//! The service issues short-lived bearer tokens with refresh tokens. The
//! [`client::OAuthClient`] keeps one user's [`token::TokenStore`] fresh and
//! transparently retries a request once after a 401. The
//! [`authenticator::Authenticator`] turns a login callback code into a local
//! username plus a ready-to-use client.

pub mod authenticator;
pub mod client;
pub mod token;

use std::time::Duration;

/// Scopes requested at login: profile lookup, credential download, cluster creation.
pub const LOGIN_SCOPES: &[&str] = &["identity", "cluster_credentials", "create_cluster"];

/// Sent on every request to the provisioning service.
pub const USER_AGENT: &str = concat!("whalespawn/", env!("CARGO_PKG_VERSION"));

/// Endpoints and client credentials for the provisioning service.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    /// Base URL of the service, e.g. `https://oauth.getcarina.com`.
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Redirect URI registered for this client.
    pub callback_url: String,
    /// Timeout applied to every HTTP request.
    pub request_timeout: Duration,
}

impl OAuthSettings {
    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.base())
    }

    pub fn profile_url(&self) -> String {
        format!("{}/me", self.base())
    }

    pub fn cluster_url(&self, cluster: &str) -> String {
        format!("{}/clusters/{cluster}", self.base())
    }

    /// Authorization URL the browser is sent to for login.
    pub fn authorize_url(&self, state: Option<&str>) -> String {
        let scope = LOGIN_SCOPES.join(" ");
        let mut params = vec![
            ("response_type", "code"),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.callback_url.as_str()),
            ("scope", scope.as_str()),
        ];
        if let Some(state) = state {
            params.push(("state", state));
        }
        let base = format!("{}/oauth/authorize", self.base());
        match reqwest::Url::parse_with_params(&base, &params) {
            Ok(url) => url.to_string(),
            Err(_) => base,
        }
    }
}
