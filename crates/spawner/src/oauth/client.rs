// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user OAuth client: code exchange, refresh, and authorized requests.

use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::oauth::token::{epoch_secs, TokenResponse, TokenStore};
use crate::oauth::{OAuthSettings, USER_AGENT};

/// Why an authorized request produced no response.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// No usable token and refreshing failed.
    #[error(transparent)]
    Auth(#[from] Error),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl RequestError {
    /// Keep auth failures as they are and wrap transport failures with the
    /// caller's own error variant.
    pub fn into_error(self, transport: impl FnOnce(String) -> Error) -> Error {
        match self {
            Self::Auth(e) => e,
            Self::Transport(e) => transport(e.to_string()),
        }
    }
}

/// Profile returned by the identity endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// OAuth client owned by one user's spawner.
pub struct OAuthClient {
    settings: OAuthSettings,
    /// Used for log attribution only.
    user: String,
    http: reqwest::Client,
    /// Current token store; subscribers see every replacement.
    tokens: watch::Sender<Option<TokenStore>>,
}

impl OAuthClient {
    pub fn new(settings: OAuthSettings, user: impl Into<String>) -> Self {
        crate::engine::tls::ensure_crypto();
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { settings, user: user.into(), http, tokens: watch::Sender::new(None) }
    }

    /// Build a client that already holds persisted tokens (restart case).
    pub fn with_tokens(settings: OAuthSettings, user: impl Into<String>, tokens: TokenStore) -> Self {
        let client = Self::new(settings, user);
        client.seed(tokens);
        client
    }

    /// Re-attribute this client once the user's name is known.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    /// Replace the current token store.
    pub fn seed(&self, tokens: TokenStore) {
        self.tokens.send_replace(Some(tokens));
    }

    /// Snapshot of the current token store, for persistence.
    pub fn tokens(&self) -> Option<TokenStore> {
        self.tokens.borrow().clone()
    }

    /// Notified whenever the token store is replaced, including by a
    /// refresh. The current value counts as already seen.
    pub fn subscribe(&self) -> watch::Receiver<Option<TokenStore>> {
        self.tokens.subscribe()
    }

    /// Exchange an authorization code for a token pair.
    pub async fn request_tokens(&self, authorization_code: &str) -> Result<TokenStore> {
        let requested_at = epoch_secs();
        let resp = self
            .http
            .post(self.settings.token_url())
            .header(ACCEPT, "application/json")
            .form(&[
                ("code", authorization_code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.settings.callback_url.as_str()),
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::TokenExchange { status: None, body: e.to_string() })?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(status = %status, body = %text, "token exchange rejected");
            return Err(Error::TokenExchange { status: Some(status.as_u16()), body: text });
        }

        let token: TokenResponse = serde_json::from_str(&text).map_err(|e| {
            Error::TokenExchange {
                status: Some(status.as_u16()),
                body: format!("invalid token response: {e}"),
            }
        })?;
        let store = TokenStore::from_response(token, requested_at);
        self.seed(store.clone());
        debug!(user = %self.user, expires_at = store.expires_at(), "oauth tokens issued");
        Ok(store)
    }

    /// Trade the current refresh token for a new token pair.
    pub async fn refresh_tokens(&self) -> Result<TokenStore> {
        let refresh_token = self
            .tokens
            .borrow()
            .as_ref()
            .and_then(|t| t.refresh_token().map(str::to_owned))
            .ok_or_else(|| self.refresh_error("no refresh token available"))?;

        let requested_at = epoch_secs();
        let resp = self
            .http
            .post(self.settings.token_url())
            .header(ACCEPT, "application/json")
            .form(&[
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| self.refresh_error(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(user = %self.user, status = %status, body = %text, "token refresh rejected");
            return Err(self.refresh_error(format!("({status}) {text}")));
        }

        let token: TokenResponse = serde_json::from_str(&text)
            .map_err(|e| self.refresh_error(format!("invalid token response: {e}")))?;
        // Providers may omit the refresh token when it is not rotated.
        let refresh = token.refresh_token.or(Some(refresh_token));
        let store = TokenStore::new(
            token.access_token,
            refresh,
            requested_at.saturating_add(token.expires_in),
        );
        self.seed(store.clone());
        info!(user = %self.user, "oauth tokens refreshed");
        Ok(store)
    }

    /// Send a bearer-authenticated request built by `build`.
    ///
    /// Refreshes up front when the token is (nearly) expired. A 401 triggers
    /// one refresh and one retry; a second 401 is returned as-is.
    pub async fn authorized_request<F>(&self, build: F) -> Result<Response, RequestError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let token = self.usable_access_token().await?;
        let resp = build(&self.http).bearer_auth(token).send().await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        debug!(user = %self.user, "request unauthorized, refreshing tokens and retrying");
        let store = self.refresh_tokens().await?;
        let resp = build(&self.http).bearer_auth(store.access_token()).send().await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            warn!(user = %self.user, "request still unauthorized after token refresh");
        }
        Ok(resp)
    }

    /// Look up the signed-in user's profile.
    pub async fn get_user_profile(&self) -> Result<UserProfile> {
        let url = self.settings.profile_url();
        let resp = self
            .authorized_request(|http| http.get(&url).header(ACCEPT, "application/json"))
            .await
            .map_err(|e| e.into_error(|reason| self.profile_error(reason)))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(self.profile_error(format!("({status}) {text}")));
        }
        serde_json::from_str(&text)
            .map_err(|e| self.profile_error(format!("invalid profile response: {e}")))
    }

    async fn usable_access_token(&self) -> Result<String> {
        let current = self.tokens.borrow().clone();
        match current {
            None => Err(self.refresh_error("not signed in")),
            Some(store) if store.is_expired(epoch_secs()) => {
                debug!(user = %self.user, "access token expired, refreshing");
                Ok(self.refresh_tokens().await?.access_token().to_owned())
            }
            Some(store) => Ok(store.access_token().to_owned()),
        }
    }

    fn refresh_error(&self, reason: impl Into<String>) -> Error {
        Error::TokenRefresh { user: self.user.clone(), reason: reason.into() }
    }

    fn profile_error(&self, reason: impl Into<String>) -> Error {
        Error::ProfileFetch { user: self.user.clone(), reason: reason.into() }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
