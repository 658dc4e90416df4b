// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cluster::lock::BundleLocks;
use crate::config::Config;
use crate::engine::EngineConnector;
use crate::error::Result;
use crate::oauth::authenticator::Authenticator;
use crate::oauth::client::OAuthClient;
use crate::spawner::persist::StateStore;
use crate::spawner::SpawnerStateMachine;

/// Shared hub state.
pub struct HubState {
    pub config: Config,
    /// One spawner per signed-in user, keyed by local username.
    pub sessions: RwLock<HashMap<String, Arc<SpawnerStateMachine>>>,
    pub authenticator: Authenticator,
    pub connector: Arc<dyn EngineConnector>,
    pub locks: BundleLocks,
    pub store: StateStore,
    pub shutdown: CancellationToken,
}

impl HubState {
    pub fn new(
        config: Config,
        authenticator: Authenticator,
        connector: Arc<dyn EngineConnector>,
        shutdown: CancellationToken,
    ) -> Self {
        let store = StateStore::new(&config.state_dir);
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            authenticator,
            connector,
            locks: BundleLocks::new(),
            store,
            shutdown,
        }
    }

    /// Build a spawner around `client` (not yet registered).
    pub fn new_spawner(&self, client: OAuthClient) -> Arc<SpawnerStateMachine> {
        Arc::new(SpawnerStateMachine::new(
            self.config.spawner_settings(),
            Arc::new(client),
            self.locks.clone(),
            Arc::clone(&self.connector),
        ))
    }

    pub async fn session(&self, user: &str) -> Option<Arc<SpawnerStateMachine>> {
        self.sessions.read().await.get(user).cloned()
    }

    /// Register the spawner for `client`'s user, or hand the tokens to the
    /// existing one.
    pub async fn sign_in(&self, client: OAuthClient) -> Arc<SpawnerStateMachine> {
        let user = client.user().to_owned();
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&user) {
            if let Some(tokens) = client.tokens() {
                existing.oauth().seed(tokens);
            }
            return Arc::clone(existing);
        }
        let machine = self.new_spawner(client);
        self.watch_tokens(&machine);
        sessions.insert(user, Arc::clone(&machine));
        machine
    }

    /// Write `machine`'s state to disk. Failures are logged, not returned.
    pub fn persist(&self, machine: &SpawnerStateMachine) {
        save_state(&self.store, machine);
    }

    /// Persist `machine` every time its tokens are replaced, so a refresh
    /// during a long credential poll survives a restart.
    fn watch_tokens(&self, machine: &Arc<SpawnerStateMachine>) {
        let mut updates = machine.oauth().subscribe();
        let weak: Weak<SpawnerStateMachine> = Arc::downgrade(machine);
        let store = self.store.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
                let Some(machine) = weak.upgrade() else { break };
                save_state(&store, &machine);
            }
        });
    }

    /// Recreate spawners from persisted state.
    pub async fn restore(&self) -> Result<usize> {
        let saved = self.store.load_all()?;
        let mut sessions = self.sessions.write().await;
        for (user, state) in saved {
            let client = OAuthClient::new(self.authenticator.settings().clone(), user.clone());
            let machine = self.new_spawner(client);
            machine.load_state(state);
            self.watch_tokens(&machine);
            sessions.insert(user, machine);
        }
        let count = sessions.len();
        if count > 0 {
            info!(count, "restored spawner sessions");
        }
        Ok(count)
    }

    /// Run `start()` in the background and persist the outcome.
    pub fn spawn_start(self: &Arc<Self>, machine: Arc<SpawnerStateMachine>) {
        let state = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                // Errors are logged and recorded in the phase by `start`.
                _ = machine.start() => {}
                _ = state.shutdown.cancelled() => machine.cancel(),
            }
            state.persist(&machine);
        });
    }
}

fn save_state(store: &StateStore, machine: &SpawnerStateMachine) {
    if let Err(e) = store.save(machine.user(), &machine.get_state()) {
        warn!(user = %machine.user(), err = %e, "failed to persist spawner state");
    }
}
