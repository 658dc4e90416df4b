// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawner state persistence: one JSON file per user with atomic writes.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Error, Result};
use crate::spawner::{is_valid_username, SpawnerState};

/// `<state_dir>/users/<user>.json`.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(state_dir: &Path) -> Self {
        Self { dir: state_dir.join("users") }
    }

    pub fn path_for(&self, user: &str) -> PathBuf {
        self.dir.join(format!("{user}.json"))
    }

    pub fn load(&self, user: &str) -> Result<Option<SpawnerState>> {
        let path = self.path_for(user);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| Error::Persist(format!("{}: {e}", path.display())))
    }

    /// Every user with a readable state file. Unreadable files are skipped.
    pub fn load_all(&self) -> Result<Vec<(String, SpawnerState)>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut states = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(user) = path.file_stem().and_then(|s| s.to_str()).map(str::to_owned) else {
                continue;
            };
            if !is_valid_username(&user) {
                continue;
            }
            match self.load(&user) {
                Ok(Some(state)) => states.push((user, state)),
                Ok(None) => {}
                Err(e) => warn!(user = %user, err = %e, "skipping unreadable spawner state"),
            }
        }
        states.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(states)
    }

    /// Write `state` atomically (unique tmp file + rename).
    pub fn save(&self, user: &str, state: &SpawnerState) -> Result<()> {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(state).map_err(|e| Error::Persist(e.to_string()))?;
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = self.path_for(user);
        let tmp_path = self.dir.join(format!(".{user}.json.{}.{seq}.tmp", std::process::id()));
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    pub fn remove(&self, user: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(user)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
