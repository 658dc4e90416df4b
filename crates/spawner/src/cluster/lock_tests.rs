// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;
use std::time::Duration;

use super::*;

#[tokio::test]
async fn same_dir_is_exclusive() {
    let locks = BundleLocks::new();
    let dir = Path::new("/tmp/bundles/alice/acme");

    let guard = locks.lock(dir).await;
    let second = tokio::time::timeout(Duration::from_millis(50), locks.lock(dir)).await;
    assert!(second.is_err(), "second lock should wait");

    drop(guard);
    let second = tokio::time::timeout(Duration::from_secs(1), locks.lock(dir)).await;
    assert!(second.is_ok());
}

#[tokio::test]
async fn different_dirs_do_not_block() {
    let locks = BundleLocks::new();
    let _a = locks.lock(Path::new("/tmp/bundles/alice/acme")).await;
    let b = tokio::time::timeout(
        Duration::from_secs(1),
        locks.lock(Path::new("/tmp/bundles/bob/acme")),
    )
    .await;
    assert!(b.is_ok());
    assert_eq!(locks.len(), 2);
}

#[tokio::test]
async fn prune_keeps_held_entries() {
    let locks = BundleLocks::new();
    let held = locks.lock(Path::new("/a")).await;
    drop(locks.lock(Path::new("/b")).await);

    locks.prune();
    assert_eq!(locks.len(), 1);

    drop(held);
    locks.prune();
    assert!(locks.is_empty());
}
