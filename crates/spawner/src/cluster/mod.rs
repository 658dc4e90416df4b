// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster provisioning and the on-disk credential bundle.

pub mod bundle;
pub mod lock;
pub mod provisioner;

use std::path::{Path, PathBuf};

/// `<credentials_root>/<user>/<cluster>`.
pub fn bundle_dir(root: &Path, user: &str, cluster: &str) -> PathBuf {
    root.join(user).join(cluster)
}
