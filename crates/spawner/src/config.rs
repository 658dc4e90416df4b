// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::oauth::OAuthSettings;
use crate::spawner::SpawnerSettings;

/// Configuration for the whalespawn hub.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "whalespawn", version, about = "Per-user notebook servers on provisioned clusters")]
pub struct Config {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "WHALESPAWN_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9700, env = "WHALESPAWN_PORT")]
    pub port: u16,

    /// Bearer token for the admin API. If unset, auth is disabled.
    #[arg(long, env = "WHALESPAWN_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Base URL of the OAuth / cluster provisioning service.
    #[arg(long, default_value = "https://oauth.getcarina.com", env = "WHALESPAWN_OAUTH_HOST")]
    pub oauth_host: String,

    /// OAuth client id.
    #[arg(long, env = "WHALESPAWN_CLIENT_ID", default_value = "")]
    pub client_id: String,

    /// OAuth client secret.
    #[arg(long, env = "WHALESPAWN_CLIENT_SECRET", default_value = "", hide_env_values = true)]
    pub client_secret: String,

    /// Redirect URI registered with the provider.
    #[arg(
        long,
        default_value = "http://127.0.0.1:9700/oauth/callback",
        env = "WHALESPAWN_CALLBACK_URL"
    )]
    pub callback_url: String,

    /// HTTP timeout for provider and engine requests, in seconds.
    #[arg(long, default_value_t = 300, env = "WHALESPAWN_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: u64,

    /// Name of the cluster created for each user.
    #[arg(long, default_value = "howtowhale", env = "WHALESPAWN_CLUSTER_NAME")]
    pub cluster_name: String,

    /// Seconds between credential downloads while a cluster is not yet active.
    #[arg(long, default_value_t = 30, env = "WHALESPAWN_POLL_INTERVAL_SECS")]
    pub poll_interval_secs: u64,

    /// Give up waiting for credentials after this many seconds. Unset waits forever.
    #[arg(long, env = "WHALESPAWN_CREDENTIAL_TIMEOUT_SECS")]
    pub credential_timeout_secs: Option<u64>,

    /// Root of the per-user credential bundles.
    #[arg(long, default_value = "/data/clusters", env = "WHALESPAWN_CREDENTIALS_ROOT")]
    pub credentials_root: PathBuf,

    /// Directory for persisted spawner state.
    #[arg(long, default_value = "/data/state", env = "WHALESPAWN_STATE_DIR")]
    pub state_dir: PathBuf,

    /// Notebook image started for each user.
    #[arg(long, default_value = "jupyter/minimal-notebook", env = "WHALESPAWN_IMAGE")]
    pub image: String,

    /// Prefix of container names (`<prefix>-<user>`).
    #[arg(long, default_value = "jupyter", env = "WHALESPAWN_CONTAINER_PREFIX")]
    pub container_prefix: String,

    /// Port the notebook server listens on inside the container.
    #[arg(long, default_value_t = 8888, env = "WHALESPAWN_NOTEBOOK_PORT")]
    pub notebook_port: u16,

    /// Containers whose volumes are mounted into each notebook container.
    #[arg(long, default_value = "swarm-data", env = "WHALESPAWN_VOLUMES_FROM", value_delimiter = ',')]
    pub volumes_from: Vec<String>,

    /// Path of the credential bundle inside the notebook container.
    #[arg(long, default_value = "/var/run/docker/", env = "WHALESPAWN_CERT_PATH")]
    pub cert_path: String,

    /// Extra container environment, `KEY=VALUE`.
    #[arg(long = "env", env = "WHALESPAWN_EXTRA_ENV", value_delimiter = ',')]
    pub extra_env: Vec<String>,

    /// JSON file mapping provider usernames to local usernames.
    #[arg(long, env = "WHALESPAWN_USERNAME_MAP")]
    pub username_map: Option<PathBuf>,

    /// Users allowed to sign in. Empty allows everyone.
    #[arg(long = "allow-user", env = "WHALESPAWN_ALLOWED_USERS", value_delimiter = ',')]
    pub allowed_users: Vec<String>,

    /// Log format (json or text).
    #[arg(long, env = "WHALESPAWN_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level filter.
    #[arg(long, env = "WHALESPAWN_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn credential_timeout(&self) -> Option<Duration> {
        self.credential_timeout_secs.map(Duration::from_secs)
    }

    pub fn oauth_settings(&self) -> OAuthSettings {
        OAuthSettings {
            base_url: self.oauth_host.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            callback_url: self.callback_url.clone(),
            request_timeout: self.request_timeout(),
        }
    }

    pub fn spawner_settings(&self) -> SpawnerSettings {
        SpawnerSettings {
            cluster_name: self.cluster_name.clone(),
            poll_interval: self.poll_interval(),
            credential_timeout: self.credential_timeout(),
            credentials_root: self.credentials_root.clone(),
            image: self.image.clone(),
            container_prefix: self.container_prefix.clone(),
            notebook_port: self.notebook_port,
            volumes_from: self.volumes_from.iter().filter(|v| !v.is_empty()).cloned().collect(),
            cert_path: self.cert_path.clone(),
            extra_env: parse_env(&self.extra_env),
        }
    }
}

/// Parse `KEY=VALUE` pairs; entries without `=` are dropped.
fn parse_env(pairs: &[String]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .filter_map(|pair| pair.split_once('='))
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
