// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Login: turn a callback code into a local username and a signed-in client.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::oauth::client::OAuthClient;
use crate::oauth::OAuthSettings;

/// A completed login.
pub struct Login {
    /// Local username after remapping.
    pub username: String,
    /// Client already holding the user's tokens.
    pub client: OAuthClient,
}

pub struct Authenticator {
    settings: OAuthSettings,
    /// Provider username → local username.
    username_map: HashMap<String, String>,
    /// Empty means everyone may sign in.
    allowed: HashSet<String>,
}

impl Authenticator {
    pub fn new(settings: OAuthSettings) -> Self {
        Self { settings, username_map: HashMap::new(), allowed: HashSet::new() }
    }

    pub fn with_username_map(mut self, map: HashMap<String, String>) -> Self {
        self.username_map = map;
        self
    }

    pub fn with_allowed(mut self, allowed: impl IntoIterator<Item = String>) -> Self {
        self.allowed = allowed.into_iter().collect();
        self
    }

    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    /// Map a provider username to the local one.
    pub fn local_name(&self, provider_name: &str) -> String {
        self.username_map.get(provider_name).cloned().unwrap_or_else(|| provider_name.to_owned())
    }

    pub fn is_allowed(&self, username: &str) -> bool {
        self.allowed.is_empty() || self.allowed.contains(username)
    }

    /// Exchange `code`, look up the profile and apply the username map and
    /// allow-list.
    pub async fn authenticate(&self, code: &str) -> Result<Login> {
        let client = OAuthClient::new(self.settings.clone(), "<login>");
        client.request_tokens(code).await?;
        let profile = client.get_user_profile().await?;

        let username = self.local_name(&profile.username);
        if !self.is_allowed(&username) {
            warn!(user = %username, provider_user = %profile.username, "login rejected by allow-list");
            return Err(Error::Unauthorized(username));
        }

        info!(user = %username, provider_user = %profile.username, "user signed in");
        Ok(Login { client: client.with_user(username.clone()), username })
    }
}

/// Load a JSON object of `provider name → local name` from `path`.
pub fn load_username_map(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
#[path = "authenticator_tests.rs"]
mod tests;
