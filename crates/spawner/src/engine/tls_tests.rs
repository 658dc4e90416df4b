// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const CA: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/ca.pem"));
const CERT: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/cert.pem"));
const KEY: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/key.pem"));

#[test]
fn builds_config_from_bundle_pems() {
    let result = client_config(CERT, KEY, CA);
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn rejects_garbage_key() {
    let err = client_config(CERT, b"not a key", CA).expect_err("garbage key");
    assert!(matches!(err, EngineError::Tls(ref msg) if msg.contains("key.pem")), "{err}");
}

#[test]
fn rejects_empty_ca() {
    let err = client_config(CERT, KEY, b"").expect_err("empty ca");
    assert!(matches!(err, EngineError::Tls(ref msg) if msg.contains("ca.pem")), "{err}");
}

#[test]
fn rejects_missing_client_cert() {
    let err = client_config(b"", KEY, CA).expect_err("empty cert");
    assert!(matches!(err, EngineError::Tls(ref msg) if msg.contains("cert.pem")), "{err}");
}

#[test]
fn ensure_crypto_is_idempotent() {
    ensure_crypto();
    ensure_crypto();
    assert!(rustls::crypto::CryptoProvider::get_default().is_some());
}

/// Server certificate from the bundle CA, issued for a DNS name only.
const SERVER: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/server.pem"));
/// Same shape, signed by an unrelated CA.
const FOREIGN: &[u8] =
    include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/foreign-server.pem"));

fn engine_ip() -> ServerName<'static> {
    ServerName::try_from("172.99.65.237").expect("ip server name")
}

fn verify(verifier: &dyn ServerCertVerifier, pem: &[u8]) -> Result<ServerCertVerified, rustls::Error> {
    let cert = CertificateDer::from_pem_slice(pem).expect("server cert");
    verifier.verify_server_cert(&cert, &[], &engine_ip(), &[], UnixTime::now())
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

#[test]
fn accepts_bundle_ca_cert_at_ip_endpoint() {
    let verifier = server_verifier(CA, provider()).expect("verifier");
    let result = verify(&verifier, SERVER);
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn name_check_alone_would_reject_ip_endpoint() {
    let verifier = server_verifier(CA, provider()).expect("verifier");
    let err = verify(&*verifier.inner, SERVER).expect_err("name mismatch");
    assert!(
        matches!(
            err,
            rustls::Error::InvalidCertificate(
                CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. }
            )
        ),
        "{err:?}"
    );
}

#[test]
fn rejects_cert_from_foreign_ca() {
    let verifier = server_verifier(CA, provider()).expect("verifier");
    let err = verify(&verifier, FOREIGN).expect_err("foreign ca");
    assert!(
        matches!(err, rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer)),
        "{err:?}"
    );
}

#[test]
fn rejects_client_only_cert_as_server() {
    let verifier = server_verifier(CA, provider()).expect("verifier");
    assert!(verify(&verifier, CERT).is_err());
}
