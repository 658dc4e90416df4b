// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user notebook server lifecycle.

pub mod machine;
pub mod persist;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::oauth::token::TokenStore;

pub use machine::SpawnerStateMachine;

/// Usernames become path components, so only a conservative set is accepted.
pub fn is_valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && !name.starts_with(['.', '-'])
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Settings shared by every user's spawner.
#[derive(Debug, Clone)]
pub struct SpawnerSettings {
    pub cluster_name: String,
    pub poll_interval: Duration,
    pub credential_timeout: Option<Duration>,
    pub credentials_root: PathBuf,
    pub image: String,
    /// Containers are named `<prefix>-<user>`.
    pub container_prefix: String,
    pub notebook_port: u16,
    pub volumes_from: Vec<String>,
    /// Where the bundle is visible inside the notebook container.
    pub cert_path: String,
    /// Added to the container environment after the engine variables.
    pub extra_env: BTreeMap<String, String>,
}

impl SpawnerSettings {
    pub fn container_name(&self, user: &str) -> String {
        format!("{}-{user}", self.container_prefix)
    }

    pub fn bundle_dir(&self, user: &str) -> PathBuf {
        crate::cluster::bundle_dir(&self.credentials_root, user, &self.cluster_name)
    }
}

/// Where a spawner is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "reason", rename_all = "snake_case")]
pub enum SpawnPhase {
    Idle,
    ProvisioningCluster,
    DownloadingCredentials,
    PullingImage,
    StartingContainer,
    Running,
    Stopped,
    Failed(String),
}

impl SpawnPhase {
    /// True while `start()` is working through its steps.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::ProvisioningCluster
                | Self::DownloadingCredentials
                | Self::PullingImage
                | Self::StartingContainer
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ProvisioningCluster => "provisioning_cluster",
            Self::DownloadingCredentials => "downloading_credentials",
            Self::PullingImage => "pulling_image",
            Self::StartingContainer => "starting_container",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for SpawnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Outcome of [`SpawnerStateMachine::poll`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollStatus {
    NotRunning,
    Starting,
    Running,
    Exited { exit_code: i64, error: String, finished_at: String },
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRunning => f.write_str("not running"),
            Self::Starting => f.write_str("starting"),
            Self::Running => f.write_str("running"),
            Self::Exited { exit_code, error, finished_at } => {
                write!(f, "ExitCode={exit_code}, Error='{error}', FinishedAt={finished_at}")
            }
        }
    }
}

/// Where a started server can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerLocation {
    pub container_id: String,
    pub ip: Option<String>,
    pub port: Option<u16>,
}

/// Spawner state persisted across restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnerState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenStore>,
}
