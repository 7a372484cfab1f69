//! Key set fetching against a stub JWKS endpoint.

use std::io::Write;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hsm_auth::{Authenticator, JwtAuthenticator, KeySet, KeySetConfig, KeySetError};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OLD_SECRET: &[u8] = b"hsm-test-signing-secret-012345678901";
const NEW_SECRET: &[u8] = b"hsm-test-rotated-secret-012345678901";

// =========================================================================
// Helpers
// =========================================================================

fn jwks(kid: &str, secret: &[u8]) -> serde_json::Value {
    json!({ "keys": [{ "kty": "oct", "kid": kid, "alg": "HS256", "k": URL_SAFE_NO_PAD.encode(secret) }] })
}

fn config(server: &MockServer) -> KeySetConfig {
    KeySetConfig::new(Url::parse(&format!("{}/jwks", server.uri())).unwrap())
}

fn token(kid: &str, secret: &[u8]) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(kid.into());
    encode(&header, &json!({ "sub": "alice" }), &EncodingKey::from_secret(secret)).unwrap()
}

async fn fetch_count(server: &MockServer) -> usize {
    server.received_requests().await.map_or(0, |r| r.len())
}

// =========================================================================
// Startup fetch
// =========================================================================

#[tokio::test]
async fn test_fetch_loads_keys() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks("k1", OLD_SECRET)))
        .mount(&server)
        .await;

    let keys = KeySet::fetch(config(&server)).await.unwrap();
    assert_eq!(keys.len().await, 1);
}

#[tokio::test]
async fn test_fetch_error_status_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = KeySet::fetch(config(&server)).await.err().unwrap();
    assert!(matches!(err, KeySetError::Status { status: 503 }));
}

#[tokio::test]
async fn test_fetch_garbage_body_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = KeySet::fetch(config(&server)).await.err().unwrap();
    assert!(matches!(err, KeySetError::Decode(_)));
}

#[tokio::test]
async fn test_fetch_presents_bearer_token_from_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer sa-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks("k1", OLD_SECRET)))
        .expect(1)
        .mount(&server)
        .await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "sa-token").unwrap();

    KeySet::fetch(config(&server).with_bearer_token_file(file.path()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_fetch_missing_ca_cert_fails_before_any_request() {
    let server = MockServer::start().await;

    let err = KeySet::fetch(config(&server).with_ca_cert("/nonexistent/ca.pem"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, KeySetError::CaCertRead { .. }));
    assert_eq!(fetch_count(&server).await, 0);
}

// =========================================================================
// Re-fetch on unknown kid
// =========================================================================

#[tokio::test]
async fn test_unknown_kid_refetches_and_accepts_rotated_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks("k1", OLD_SECRET)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks("k2", NEW_SECRET)))
        .mount(&server)
        .await;

    let auth = JwtAuthenticator::new(KeySet::fetch(config(&server)).await.unwrap());
    let subject = auth.authenticate(&token("k2", NEW_SECRET)).await.unwrap();

    assert_eq!(subject.as_str(), "alice");
    assert_eq!(fetch_count(&server).await, 2);
}

#[tokio::test]
async fn test_unknown_kid_refetch_respects_cooldown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks("k1", OLD_SECRET)))
        .mount(&server)
        .await;

    let auth = JwtAuthenticator::new(KeySet::fetch(config(&server)).await.unwrap());
    for _ in 0..5 {
        assert!(auth.authenticate(&token("forged", OLD_SECRET)).await.is_err());
    }

    // Startup plus one kid-miss fetch; the rest fall inside the cooldown.
    assert_eq!(fetch_count(&server).await, 2);
}

#[tokio::test]
async fn test_unknown_kid_without_cooldown_refetches_each_time() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks("k1", OLD_SECRET)))
        .mount(&server)
        .await;

    let keys = KeySet::fetch(config(&server).with_refresh_cooldown(Duration::ZERO))
        .await
        .unwrap();
    let auth = JwtAuthenticator::new(keys);
    for _ in 0..3 {
        let _ = auth.authenticate(&token("forged", OLD_SECRET)).await;
    }

    assert_eq!(fetch_count(&server).await, 4);
}

#[tokio::test]
async fn test_failed_refetch_keeps_previous_keys() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks("k1", OLD_SECRET)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let auth = JwtAuthenticator::new(KeySet::fetch(config(&server)).await.unwrap());
    assert!(auth.authenticate(&token("k2", NEW_SECRET)).await.is_err());

    // The original key still verifies.
    assert!(auth.authenticate(&token("k1", OLD_SECRET)).await.is_ok());
    assert_eq!(auth.keys().len().await, 1);
}

// =========================================================================
// Re-fetch on TTL
// =========================================================================

#[tokio::test]
async fn test_lapsed_ttl_refetches_on_next_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks("k1", OLD_SECRET)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks("k2", NEW_SECRET)))
        .mount(&server)
        .await;

    let short = config(&server)
        .with_default_ttl(Duration::from_millis(50))
        .with_ttl_bounds(Duration::from_millis(50), Duration::from_secs(1));
    let keys = KeySet::fetch(short).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let found = keys.candidates(None).await;

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].kid.as_deref(), Some("k2"));
    assert_eq!(fetch_count(&server).await, 2);
}
