// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::HeaderValue;

use super::*;

fn headers(auth: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(value) = auth {
        headers.insert("authorization", HeaderValue::from_str(value).expect("header"));
    }
    headers
}

#[yare::parameterized(
    disabled = { None, None, true },
    disabled_ignores_header = { None, Some("Bearer x"), true },
    matching = { Some("secret"), Some("Bearer secret"), true },
    wrong_token = { Some("secret"), Some("Bearer secreT"), false },
    wrong_scheme = { Some("secret"), Some("Basic secret"), false },
    missing = { Some("secret"), None, false },
    prefix_only = { Some("secret"), Some("Bearer "), false },
)]
fn bearer_validation(expected: Option<&str>, header: Option<&str>, ok: bool) {
    assert_eq!(validate_bearer(&headers(header), expected).is_ok(), ok);
}

#[test]
fn public_paths() {
    assert!(is_public("/api/v1/health"));
    assert!(is_public("/oauth/callback"));
    assert!(is_public("/oauth/login"));
    assert!(!is_public("/api/v1/users"));
    assert!(!is_public("/api/v1/health/extra"));
}
