// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::oauth::token::TokenStore;

use super::*;

fn state(id: &str) -> SpawnerState {
    SpawnerState {
        container_id: Some(id.to_owned()),
        tokens: Some(TokenStore::new("a".into(), Some("r".into()), 99)),
    }
}

#[test]
fn save_then_load() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = StateStore::new(tmp.path());

    store.save("alice", &state("c1"))?;
    assert_eq!(store.path_for("alice"), tmp.path().join("users").join("alice.json"));
    assert_eq!(store.load("alice")?, Some(state("c1")));
    assert_eq!(store.load("bob")?, None);

    // No temp files left behind.
    let names: Vec<_> = std::fs::read_dir(tmp.path().join("users"))?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["alice.json"]);
    Ok(())
}

#[test]
fn overwrite_replaces_whole_record() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = StateStore::new(tmp.path());

    store.save("alice", &state("a-much-longer-container-identifier"))?;
    store.save("alice", &SpawnerState::default())?;
    assert_eq!(store.load("alice")?, Some(SpawnerState::default()));
    Ok(())
}

#[test]
fn load_all_skips_bad_files() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = StateStore::new(tmp.path());
    assert!(store.load_all()?.is_empty());

    store.save("bob", &state("c2"))?;
    store.save("alice", &state("c1"))?;
    std::fs::write(tmp.path().join("users").join("broken.json"), "{not json")?;
    std::fs::write(tmp.path().join("users").join("notes.txt"), "ignored")?;

    let all = store.load_all()?;
    let users: Vec<_> = all.iter().map(|(u, _)| u.as_str()).collect();
    assert_eq!(users, vec!["alice", "bob"]);
    Ok(())
}

#[test]
fn tokens_are_stored_under_their_own_key() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = StateStore::new(tmp.path());
    store.save("alice", &state("c1"))?;

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.path_for("alice"))?)?;
    assert_eq!(raw["container_id"], "c1");
    assert_eq!(raw["tokens"]["access_token"], "a");
    assert_eq!(raw["tokens"]["refresh_token"], "r");
    assert_eq!(raw["tokens"]["expires_at"], 99);
    Ok(())
}

#[yare::parameterized(
    wrong_type = { r#"{"container_id":"c1","tokens":{"access_token":5,"expires_at":99}}"# },
    missing_expiry = { r#"{"tokens":{"access_token":"a","refresh_token":"r"}}"# },
    not_an_object = { r#"{"tokens":"a"}"# },
)]
fn malformed_tokens_fail_to_load(contents: &str) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = StateStore::new(tmp.path());
    std::fs::create_dir_all(tmp.path().join("users")).expect("users dir");
    std::fs::write(store.path_for("alice"), contents).expect("write state");

    let err = store.load("alice").expect_err("malformed tokens");
    assert!(matches!(err, Error::Persist(_)), "{err}");
}

#[test]
fn remove_is_idempotent() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = StateStore::new(tmp.path());
    store.save("alice", &state("c1"))?;

    store.remove("alice")?;
    store.remove("alice")?;
    assert_eq!(store.load("alice")?, None);
    Ok(())
}

#[yare::parameterized(
    plain = { "alice", true },
    dotted = { "alice.smith", true },
    underscore = { "a_b-c", true },
    empty = { "", false },
    traversal = { "..", false },
    hidden = { ".alice", false },
    slash = { "a/b", false },
    space = { "a b", false },
    leading_dash = { "-rf", false },
)]
fn username_validation(name: &str, valid: bool) {
    assert_eq!(is_valid_username(name), valid);
}
