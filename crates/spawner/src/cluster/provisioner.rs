// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster creation and credential download.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cluster::bundle::{self, CredentialBundle};
use crate::cluster::lock::BundleLocks;
use crate::error::{Error, Result};
use crate::oauth::client::OAuthClient;

/// Body marker of the 404 returned while a cluster is still being built.
pub const NOT_YET_ACTIVE: &str = "cluster is not yet active";

/// Creates clusters and downloads their credentials on behalf of one user.
pub struct ClusterProvisioner {
    oauth: Arc<OAuthClient>,
    locks: BundleLocks,
    timeout: Option<Duration>,
}

impl ClusterProvisioner {
    pub fn new(oauth: Arc<OAuthClient>, locks: BundleLocks) -> Self {
        Self { oauth, locks, timeout: None }
    }

    /// Give up on credentials after `timeout` of polling.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn user(&self) -> &str {
        self.oauth.user()
    }

    /// Create the cluster if it does not exist yet.
    pub async fn ensure_cluster(&self, name: &str) -> Result<()> {
        let url = self.oauth.settings().cluster_url(name);
        let resp = self
            .oauth
            .authorized_request(|http| {
                http.put(&url)
                    .header(ACCEPT, "application/json")
                    .header(CONTENT_TYPE, "application/json")
                    .body("{}")
            })
            .await
            .map_err(|e| e.into_error(|body| self.create_error(name, None, body)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(self.create_error(name, Some(status.as_u16()), body));
        }
        debug!(user = %self.user(), cluster = name, "cluster ensured");
        Ok(())
    }

    /// Download `name`'s credentials into `dest`, waiting while the cluster
    /// is still being built. A complete bundle already in `dest` is returned
    /// without any request.
    pub async fn fetch_credentials(
        &self,
        name: &str,
        dest: &Path,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<CredentialBundle> {
        let guard = self.locks.lock(dest).await;
        let result = self.fetch_locked(name, dest, poll_interval, cancel).await;
        drop(guard);
        self.locks.prune();
        result
    }

    async fn fetch_locked(
        &self,
        name: &str,
        dest: &Path,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<CredentialBundle> {
        if bundle::is_complete(dest) {
            debug!(user = %self.user(), cluster = name, "credentials already on disk");
            return CredentialBundle::load(dest);
        }

        let url = self.oauth.settings().cluster_url(name);
        let started = Instant::now();
        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(name));
            }

            let resp = self
                .oauth
                .authorized_request(|http| http.get(&url).header(ACCEPT, "application/zip"))
                .await
                .map_err(|e| e.into_error(|body| self.download_error(name, None, body)))?;

            let status = resp.status();
            if status.is_success() {
                let bytes = resp
                    .bytes()
                    .await
                    .map_err(|e| self.download_error(name, Some(status.as_u16()), e.to_string()))?;
                self.install(name, bytes.to_vec(), dest, status).await?;
                info!(user = %self.user(), cluster = name, dir = %dest.display(), "credentials downloaded");
                return CredentialBundle::load(dest);
            }

            let body = resp.text().await.unwrap_or_default();
            if status != StatusCode::NOT_FOUND || !body.contains(NOT_YET_ACTIVE) {
                return Err(self.download_error(name, Some(status.as_u16()), body));
            }

            if let Some(limit) = self.timeout {
                if started.elapsed() + poll_interval > limit {
                    return Err(Error::CredentialTimeout {
                        user: self.user().to_owned(),
                        cluster: name.to_owned(),
                        waited: started.elapsed(),
                    });
                }
            }

            info!(
                user = %self.user(),
                cluster = name,
                retry_in = ?poll_interval,
                "cluster is not yet active"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(self.cancelled(name)),
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    async fn install(
        &self,
        name: &str,
        bytes: Vec<u8>,
        dest: &Path,
        status: StatusCode,
    ) -> Result<()> {
        let target = dest.to_path_buf();
        let extracted =
            tokio::task::spawn_blocking(move || bundle::extract_archive(&bytes, &target)).await;
        match extracted {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(self.download_error(name, Some(status.as_u16()), e.to_string())),
            Err(e) => Err(self.download_error(name, Some(status.as_u16()), e.to_string())),
        }
    }

    fn create_error(&self, cluster: &str, status: Option<u16>, body: String) -> Error {
        Error::ClusterCreate { user: self.user().to_owned(), cluster: cluster.to_owned(), status, body }
    }

    fn download_error(&self, cluster: &str, status: Option<u16>, body: String) -> Error {
        Error::CredentialDownload {
            user: self.user().to_owned(),
            cluster: cluster.to_owned(),
            status,
            body,
        }
    }

    fn cancelled(&self, cluster: &str) -> Error {
        Error::Cancelled { user: self.user().to_owned(), cluster: cluster.to_owned() }
    }
}

#[cfg(test)]
#[path = "provisioner_tests.rs"]
mod tests;
