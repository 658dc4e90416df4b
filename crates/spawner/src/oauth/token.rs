// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth token pair with an absolute expiry.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Seconds before `expires_at` at which a token is already treated as unusable.
pub const EXPIRY_MARGIN_SECS: u64 = 60;

/// Standard OAuth2 token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Access/refresh token pair held by one user's OAuth client.
///
/// Always replaced as a whole; there is no way to update one field alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStore {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    /// Expiry as epoch seconds.
    expires_at: u64,
}

impl TokenStore {
    pub fn new(access_token: String, refresh_token: Option<String>, expires_at: u64) -> Self {
        Self { access_token, refresh_token, expires_at }
    }

    /// Build a store from a token endpoint response received for a request
    /// issued at `requested_at` (epoch seconds).
    pub fn from_response(response: TokenResponse, requested_at: u64) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: requested_at.saturating_add(response.expires_in),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    /// True once `now` is within [`EXPIRY_MARGIN_SECS`] of `expires_at`.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at.saturating_sub(EXPIRY_MARGIN_SECS)
    }

    /// Seconds of usable lifetime left, or `None` when already expired.
    pub fn expires_in(&self, now: u64) -> Option<u64> {
        if self.is_expired(now) {
            return None;
        }
        Some(self.expires_at.saturating_sub(EXPIRY_MARGIN_SECS) - now)
    }
}

pub fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
