// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote container engine capability.
//!
//! The spawner only needs a handful of operations against a cluster's
//! engine. [`RemoteEngine`] names them; [`docker::DockerEngine`] implements
//! them over the Docker Engine HTTP API with mutual TLS.

pub mod docker;
pub mod tls;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cluster::bundle::CredentialBundle;

/// Engine-side failures. `NotFound` is kept apart so callers can treat a
/// vanished container as a normal outcome.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("engine returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("engine request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("tls setup failed: {0}")]
    Tls(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// What to create on the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Environment passed to the container, `KEY` → `value`.
    pub env: BTreeMap<String, String>,
    /// Container port to publish on an engine-chosen host port.
    pub exposed_port: Option<u16>,
    /// Containers whose volumes are mounted into this one.
    pub volumes_from: Vec<String>,
}

/// State reported by `inspect`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    pub running: bool,
    pub exit_code: i64,
    pub error: String,
    pub finished_at: String,
}

/// Result of inspecting a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub state: ContainerState,
    /// IP of the swarm node running the container, when the engine reports one.
    pub node_ip: Option<String>,
    /// Host port bound to the spec's exposed port.
    pub host_port: Option<u16>,
}

/// Operations the spawner performs against a cluster engine.
#[async_trait]
pub trait RemoteEngine: Send + Sync {
    async fn inspect(&self, id: &str) -> Result<ContainerInfo, EngineError>;
    async fn pull(&self, image: &str) -> Result<(), EngineError>;
    /// Create and start a container, returning its id.
    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<String, EngineError>;
    async fn stop(&self, id: &str) -> Result<(), EngineError>;
    async fn remove(&self, id: &str) -> Result<(), EngineError>;
}

/// Builds an engine handle from a provisioned bundle.
pub trait EngineConnector: Send + Sync {
    fn connect(&self, bundle: &CredentialBundle) -> Result<Arc<dyn RemoteEngine>, EngineError>;
}
