// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Whalespawn: per-user notebook servers on remotely provisioned container
//! clusters.
//!
//! A user signs in through the provisioning service's OAuth flow. Their
//! spawner creates a cluster, waits for its TLS credential bundle, and starts
//! a notebook container on the cluster's engine.

pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod oauth;
pub mod spawner;
pub mod state;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::engine::docker::DockerConnector;
use crate::oauth::authenticator::{load_username_map, Authenticator};
use crate::state::HubState;
use crate::transport::build_router;

pub use crate::error::{Error, Result};

/// Build the authenticator described by `config`.
pub fn authenticator(config: &Config) -> anyhow::Result<Authenticator> {
    let mut auth = Authenticator::new(config.oauth_settings())
        .with_allowed(config.allowed_users.iter().filter(|u| !u.is_empty()).cloned());
    if let Some(ref path) = config.username_map {
        auth = auth.with_username_map(load_username_map(path)?);
    }
    Ok(auth)
}

/// Run the hub until shutdown.
pub async fn run(config: Config) -> anyhow::Result<()> {
    crate::engine::tls::ensure_crypto();

    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let auth = authenticator(&config)?;
    let connector = Arc::new(DockerConnector { timeout: config.request_timeout() });
    let state = Arc::new(HubState::new(config, auth, connector, shutdown.clone()));
    state.restore().await?;

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutting down");
                shutdown.cancel();
            }
        });
    }

    tracing::info!("whalespawn listening on {addr}");
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
