// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use proptest::prelude::*;

use super::*;

fn response(expires_in: u64) -> TokenResponse {
    TokenResponse {
        access_token: "access".to_owned(),
        refresh_token: Some("refresh".to_owned()),
        expires_in,
        token_type: Some("bearer".to_owned()),
    }
}

#[test]
fn fresh_token_is_not_expired() {
    let now = 1_700_000_000;
    let store = TokenStore::from_response(response(7200), now);
    assert_eq!(store.expires_at(), now + 7200);
    assert!(!store.is_expired(now));
    assert_eq!(store.expires_in(now), Some(7200 - EXPIRY_MARGIN_SECS));
}

#[test]
fn token_inside_margin_is_expired() {
    let store = TokenStore::new("a".into(), None, 1_000);
    assert!(!store.is_expired(939));
    assert!(store.is_expired(940));
    assert!(store.is_expired(1_000));
    assert_eq!(store.expires_in(940), None);
}

#[test]
fn short_lived_token_is_expired_immediately() {
    // A lifetime shorter than the margin is never usable.
    let store = TokenStore::from_response(response(30), 500);
    assert!(store.is_expired(500));
}

#[test]
fn serializes_all_three_fields() -> anyhow::Result<()> {
    let store = TokenStore::new("a".into(), Some("r".into()), 42);
    let value = serde_json::to_value(&store)?;
    assert_eq!(value["access_token"], "a");
    assert_eq!(value["refresh_token"], "r");
    assert_eq!(value["expires_at"], 42);

    let back: TokenStore = serde_json::from_value(value)?;
    assert_eq!(back, store);
    Ok(())
}

proptest! {
    #[test]
    fn expiry_matches_margin_rule(expires_at in 0u64..4_000_000_000, now in 0u64..4_000_000_000) {
        let store = TokenStore::new("a".into(), None, expires_at);
        let expected = now >= expires_at.saturating_sub(EXPIRY_MARGIN_SECS);
        prop_assert_eq!(store.is_expired(now), expected);
    }

    #[test]
    fn positive_lifetime_beyond_margin_is_usable(now in 0u64..4_000_000_000, expires_in in 61u64..1_000_000) {
        let store = TokenStore::from_response(response(expires_in), now);
        prop_assert!(!store.is_expired(now));
    }
}
