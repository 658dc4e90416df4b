// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One user's spawner: cluster → credentials → image → container.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cluster::bundle::CredentialBundle;
use crate::cluster::lock::BundleLocks;
use crate::cluster::provisioner::ClusterProvisioner;
use crate::engine::{ContainerInfo, ContainerSpec, EngineConnector, RemoteEngine};
use crate::error::{Error, Result};
use crate::oauth::client::OAuthClient;
use crate::spawner::{PollStatus, ServerLocation, SpawnPhase, SpawnerSettings, SpawnerState};

/// Drives one user's notebook server through provisioning and startup.
///
/// Locks guarding the phase, container id and location are never held
/// across an `.await`, so `poll()` and `phase()` can run while `start()` is
/// in flight.
pub struct SpawnerStateMachine {
    user: String,
    settings: SpawnerSettings,
    oauth: Arc<OAuthClient>,
    provisioner: ClusterProvisioner,
    connector: Arc<dyn EngineConnector>,
    engine: OnceCell<Arc<dyn RemoteEngine>>,
    container_id: RwLock<Option<String>>,
    location: RwLock<Option<ServerLocation>>,
    phase: RwLock<SpawnPhase>,
    /// Shared by every `start()` in flight or queued until it is cancelled.
    cancel: Mutex<CancellationToken>,
    /// Held for the whole of a `start()`.
    starting: tokio::sync::Mutex<()>,
}

impl SpawnerStateMachine {
    pub fn new(
        settings: SpawnerSettings,
        oauth: Arc<OAuthClient>,
        locks: BundleLocks,
        connector: Arc<dyn EngineConnector>,
    ) -> Self {
        let provisioner = ClusterProvisioner::new(Arc::clone(&oauth), locks)
            .with_timeout(settings.credential_timeout);
        Self {
            user: oauth.user().to_owned(),
            settings,
            oauth,
            provisioner,
            connector,
            engine: OnceCell::new(),
            container_id: RwLock::new(None),
            location: RwLock::new(None),
            phase: RwLock::new(SpawnPhase::Idle),
            cancel: Mutex::new(CancellationToken::new()),
            starting: tokio::sync::Mutex::new(()),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn phase(&self) -> SpawnPhase {
        self.phase.read().clone()
    }

    /// True while a `start()` is running.
    pub fn is_starting(&self) -> bool {
        self.starting.try_lock().is_err()
    }

    pub fn container_id(&self) -> Option<String> {
        self.container_id.read().clone()
    }

    /// Where the server was last started, if it has been.
    pub fn location(&self) -> Option<ServerLocation> {
        self.location.read().clone()
    }

    pub fn oauth(&self) -> &Arc<OAuthClient> {
        &self.oauth
    }

    /// `<credentials_root>/<user>/<cluster>`.
    pub fn bundle_dir(&self) -> PathBuf {
        self.settings.bundle_dir(&self.user)
    }

    /// Provision the cluster if needed and start the notebook container.
    ///
    /// Work already done (cluster, bundle on disk, running container) is
    /// reused, so calling again after a failure resumes where it stopped.
    /// Concurrent calls run one after another; a later one finds the
    /// container the earlier one started.
    pub async fn start(&self) -> Result<ServerLocation> {
        let cancel = {
            let mut current = self.cancel.lock();
            if current.is_cancelled() {
                *current = CancellationToken::new();
            }
            current.clone()
        };
        let _running = self.starting.lock().await;
        if cancel.is_cancelled() {
            info!(user = %self.user, "startup cancelled before it began");
            return Err(Error::Cancelled {
                user: self.user.clone(),
                cluster: self.settings.cluster_name.clone(),
            });
        }

        info!(user = %self.user, cluster = %self.settings.cluster_name, "creating notebook infrastructure");
        match self.run_start(&cancel).await {
            Ok(location) => {
                self.set_phase(SpawnPhase::Running);
                info!(
                    user = %self.user,
                    container = %location.container_id,
                    ip = location.ip.as_deref().unwrap_or("-"),
                    port = location.port.unwrap_or_default(),
                    "notebook server started"
                );
                *self.location.write() = Some(location.clone());
                Ok(location)
            }
            Err(e @ Error::Cancelled { .. }) => {
                info!(user = %self.user, "startup cancelled");
                self.set_phase(SpawnPhase::Stopped);
                Err(e)
            }
            Err(e) => {
                error!(user = %self.user, err = %e, "startup failed");
                self.set_phase(SpawnPhase::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run_start(&self, cancel: &CancellationToken) -> Result<ServerLocation> {
        let cluster = &self.settings.cluster_name;

        self.set_phase(SpawnPhase::ProvisioningCluster);
        self.provisioner.ensure_cluster(cluster).await?;

        self.set_phase(SpawnPhase::DownloadingCredentials);
        let bundle = self
            .provisioner
            .fetch_credentials(cluster, &self.bundle_dir(), self.settings.poll_interval, cancel)
            .await?;
        let engine = self.engine().await?;

        if let Some(location) = self.reuse_recorded(&engine).await? {
            return Ok(location);
        }

        self.set_phase(SpawnPhase::PullingImage);
        let image = &self.settings.image;
        debug!(user = %self.user, image = %image, "pulling image");
        engine
            .pull(image)
            .await
            .map_err(|source| Error::ImagePull { image: image.clone(), source })?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled { user: self.user.clone(), cluster: cluster.clone() });
        }

        self.set_phase(SpawnPhase::StartingContainer);
        let mut env = bundle.container_env(&self.settings.cert_path);
        env.extend(self.settings.extra_env.clone());
        let spec = ContainerSpec {
            name: self.settings.container_name(&self.user),
            image: image.clone(),
            env,
            exposed_port: Some(self.settings.notebook_port),
            volumes_from: self.settings.volumes_from.clone(),
        };
        let id = engine
            .create_and_start(&spec)
            .await
            .map_err(|source| Error::ContainerStart { user: self.user.clone(), source })?;
        *self.container_id.write() = Some(id.clone());

        let info = engine
            .inspect(&id)
            .await
            .map_err(|source| Error::ContainerLookup { id: id.clone(), source })?;
        Ok(location_of(&id, &info))
    }

    /// Reuse the recorded container when it is still running; clear it
    /// (removing a stopped one) otherwise.
    async fn reuse_recorded(&self, engine: &Arc<dyn RemoteEngine>) -> Result<Option<ServerLocation>> {
        let Some(id) = self.container_id() else {
            return Ok(None);
        };
        match engine.inspect(&id).await {
            Ok(info) if info.state.running => {
                info!(user = %self.user, container = %id, "reusing running container");
                Ok(Some(location_of(&id, &info)))
            }
            Ok(_) => {
                debug!(user = %self.user, container = %id, "removing stopped container");
                match engine.remove(&id).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(source) => {
                        return Err(Error::ContainerStart { user: self.user.clone(), source })
                    }
                }
                self.clear_state();
                Ok(None)
            }
            Err(e) if e.is_not_found() => {
                self.clear_state();
                Ok(None)
            }
            Err(source) => Err(Error::ContainerLookup { id, source }),
        }
    }

    /// Report whether the server is up.
    pub async fn poll(&self) -> Result<PollStatus> {
        if self.phase().is_in_flight() {
            return Ok(PollStatus::Starting);
        }
        let Some(id) = self.container_id() else {
            return Ok(PollStatus::NotRunning);
        };

        let engine = self.engine().await?;
        match engine.inspect(&id).await {
            Ok(info) if info.state.running => Ok(PollStatus::Running),
            Ok(info) => {
                let status = PollStatus::Exited {
                    exit_code: info.state.exit_code,
                    error: info.state.error,
                    finished_at: info.state.finished_at,
                };
                debug!(user = %self.user, container = %id, %status, "container not running");
                Ok(status)
            }
            Err(e) if e.is_not_found() => {
                info!(user = %self.user, container = %id, "container is gone");
                self.forget(&id);
                Ok(PollStatus::NotRunning)
            }
            Err(source) => Err(Error::ContainerLookup { id, source }),
        }
    }

    /// Stop the recorded container. The id is kept until `clear_state`.
    pub async fn stop(&self) -> Result<()> {
        self.cancel();
        if let Some(id) = self.container_id() {
            let engine = self.engine().await?;
            match engine.stop(&id).await {
                Ok(()) => info!(user = %self.user, container = %id, "container stopped"),
                Err(e) if e.is_not_found() => self.forget(&id),
                Err(source) => return Err(Error::ContainerStop { id, source }),
            }
        }
        self.set_phase(SpawnPhase::Stopped);
        Ok(())
    }

    /// Abort in-flight and queued starts.
    pub fn cancel(&self) {
        self.cancel.lock().cancel();
    }

    /// State to persist: the container id and the current tokens.
    pub fn get_state(&self) -> SpawnerState {
        SpawnerState { container_id: self.container_id(), tokens: self.oauth.tokens() }
    }

    /// Restore what `get_state` produced.
    pub fn load_state(&self, state: SpawnerState) {
        *self.container_id.write() = state.container_id;
        if let Some(tokens) = state.tokens {
            self.oauth.seed(tokens);
        }
    }

    /// Forget the container. Tokens are kept.
    pub fn clear_state(&self) {
        *self.container_id.write() = None;
        *self.location.write() = None;
    }

    fn forget(&self, id: &str) {
        let mut current = self.container_id.write();
        if current.as_deref() == Some(id) {
            *current = None;
        }
        drop(current);
        *self.location.write() = None;
    }

    fn set_phase(&self, phase: SpawnPhase) {
        debug!(user = %self.user, phase = %phase, "phase change");
        *self.phase.write() = phase;
    }

    /// Engine handle for the user's bundle, built once.
    async fn engine(&self) -> Result<Arc<dyn RemoteEngine>> {
        let engine = self
            .engine
            .get_or_try_init(|| async {
                let bundle = CredentialBundle::load(&self.bundle_dir())?;
                debug!(user = %self.user, endpoint = %bundle.endpoint(), "connecting to engine");
                self.connector
                    .connect(&bundle)
                    .map_err(|source| Error::EngineConnect { user: self.user.clone(), source })
            })
            .await?;
        Ok(Arc::clone(engine))
    }
}

fn location_of(id: &str, info: &ContainerInfo) -> ServerLocation {
    ServerLocation { container_id: id.to_owned(), ip: info.node_ip.clone(), port: info.host_port }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
