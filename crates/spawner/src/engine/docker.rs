// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker Engine HTTP API client for a cluster's swarm endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::cluster::bundle::CredentialBundle;
use crate::engine::{
    tls, ContainerInfo, ContainerSpec, ContainerState, EngineConnector, EngineError, RemoteEngine,
};

/// Engine client bound to one cluster endpoint.
pub struct DockerEngine {
    base_url: Url,
    http: reqwest::Client,
}

impl DockerEngine {
    /// Use an already configured HTTP client (plain HTTP in tests).
    pub fn with_client(base_url: &str, http: reqwest::Client) -> Result<Self, EngineError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| EngineError::Tls(format!("invalid engine url {base_url}: {e}")))?;
        Ok(Self { base_url, http })
    }

    /// Connect to `bundle`'s endpoint over mutual TLS.
    pub fn from_bundle(bundle: &CredentialBundle, timeout: Duration) -> Result<Self, EngineError> {
        let cert = std::fs::read(bundle.cert_path())?;
        let key = std::fs::read(bundle.key_path())?;
        let ca = std::fs::read(bundle.ca_path())?;
        let config = tls::client_config(&cert, &key, &ca)?;

        let http = reqwest::Client::builder()
            .use_preconfigured_tls(config)
            .timeout(timeout)
            .build()?;
        Self::with_client(&bundle.base_url(), http)
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(path);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    async fn start(&self, id: &str) -> Result<(), EngineError> {
        let resp = self.http.post(self.url(&format!("/containers/{id}/start"), &[])).send().await?;
        // 304: already started.
        if resp.status() == StatusCode::NOT_MODIFIED {
            return Ok(());
        }
        check(resp, id).await.map(drop)
    }
}

#[async_trait]
impl RemoteEngine for DockerEngine {
    async fn inspect(&self, id: &str) -> Result<ContainerInfo, EngineError> {
        let resp = self.http.get(self.url(&format!("/containers/{id}/json"), &[])).send().await?;
        let text = check(resp, id).await?;
        let raw: InspectResponse = serde_json::from_str(&text).map_err(|e| EngineError::Api {
            status: 200,
            message: format!("invalid inspect response: {e}"),
        })?;
        Ok(raw.into_info())
    }

    async fn pull(&self, image: &str) -> Result<(), EngineError> {
        let (from_image, tag) = split_image(image);
        debug!(image, "pulling image");
        let resp = self
            .http
            .post(self.url("/images/create", &[("fromImage", from_image), ("tag", tag)]))
            .send()
            .await?;
        let text = check(resp, image).await?;

        // Progress is streamed as JSON lines; failures arrive in-band.
        for line in text.lines() {
            if let Ok(progress) = serde_json::from_str::<PullProgress>(line) {
                if let Some(error) = progress.error {
                    return Err(EngineError::Api { status: 200, message: error });
                }
            }
        }
        Ok(())
    }

    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let mut body = json!({
            "Image": spec.image,
            "Env": env,
            "HostConfig": {
                "VolumesFrom": spec.volumes_from,
            },
        });
        if let Some(port) = spec.exposed_port {
            let key = format!("{port}/tcp");
            body["ExposedPorts"] = json!({ key.clone(): {} });
            body["HostConfig"]["PortBindings"] = json!({ key: [{ "HostPort": "" }] });
        }

        let resp = self
            .http
            .post(self.url("/containers/create", &[("name", spec.name.as_str())]))
            .json(&body)
            .send()
            .await?;
        let text = check(resp, &spec.name).await?;
        let created: CreateResponse = serde_json::from_str(&text).map_err(|e| EngineError::Api {
            status: 201,
            message: format!("invalid create response: {e}"),
        })?;

        self.start(&created.id).await?;
        debug!(id = %created.id, name = %spec.name, "container started");
        Ok(created.id)
    }

    async fn stop(&self, id: &str) -> Result<(), EngineError> {
        let resp = self.http.post(self.url(&format!("/containers/{id}/stop"), &[])).send().await?;
        if resp.status() == StatusCode::NOT_MODIFIED {
            return Ok(());
        }
        check(resp, id).await.map(drop)
    }

    async fn remove(&self, id: &str) -> Result<(), EngineError> {
        let resp =
            self.http.delete(self.url(&format!("/containers/{id}"), &[("v", "true")])).send().await?;
        check(resp, id).await.map(drop)
    }
}

/// Builds [`DockerEngine`]s from credential bundles.
#[derive(Debug, Clone)]
pub struct DockerConnector {
    pub timeout: Duration,
}

impl EngineConnector for DockerConnector {
    fn connect(&self, bundle: &CredentialBundle) -> Result<Arc<dyn RemoteEngine>, EngineError> {
        Ok(Arc::new(DockerEngine::from_bundle(bundle, self.timeout)?))
    }
}

/// Split `repo[:tag][@digest]` into repository and tag, defaulting to
/// `latest`. A digest wins over a tag and is passed as the tag, as the
/// engine expects. A colon inside the registry host (`host:5000/img`) is not
/// a tag separator.
pub(crate) fn split_image(image: &str) -> (&str, &str) {
    if let Some((named, digest)) = image.split_once('@') {
        return (split_image(named).0, digest);
    }
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (image, "latest"),
    }
}

/// Map a non-success response to an [`EngineError`], returning the body otherwise.
async fn check(resp: Response, what: &str) -> Result<String, EngineError> {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(EngineError::NotFound(what.to_owned()));
    }
    if !status.is_success() {
        let message = serde_json::from_str::<ApiMessage>(&text).map(|m| m.message).unwrap_or(text);
        return Err(EngineError::Api { status: status.as_u16(), message });
    }
    Ok(text)
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

#[derive(Deserialize)]
struct PullProgress {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct CreateResponse {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct InspectResponse {
    id: String,
    state: InspectState,
    node: Option<InspectNode>,
    network_settings: InspectNetwork,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct InspectState {
    running: bool,
    exit_code: i64,
    error: String,
    finished_at: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct InspectNode {
    #[serde(rename = "IP")]
    ip: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct InspectNetwork {
    ports: Option<std::collections::BTreeMap<String, Option<Vec<PortBinding>>>>,
}

#[derive(Deserialize)]
struct PortBinding {
    #[serde(rename = "HostIp", default)]
    host_ip: Option<String>,
    #[serde(rename = "HostPort", default)]
    host_port: Option<String>,
}

impl InspectResponse {
    fn into_info(self) -> ContainerInfo {
        let bindings: Vec<PortBinding> = self
            .network_settings
            .ports
            .unwrap_or_default()
            .into_values()
            .flatten()
            .flatten()
            .collect();
        let host_port =
            bindings.iter().find_map(|b| b.host_port.as_deref().and_then(|p| p.parse().ok()));
        // Swarm reports the node; a plain engine only has the binding address.
        let node_ip = self.node.and_then(|n| n.ip).filter(|ip| !ip.is_empty()).or_else(|| {
            bindings
                .iter()
                .filter_map(|b| b.host_ip.clone())
                .find(|ip| !ip.is_empty() && ip != "0.0.0.0")
        });

        ContainerInfo {
            id: self.id,
            state: ContainerState {
                running: self.state.running,
                exit_code: self.state.exit_code,
                error: self.state.error,
                finished_at: self.state.finished_at,
            },
            node_ip,
            host_port,
        }
    }
}

#[cfg(test)]
#[path = "docker_tests.rs"]
mod tests;
