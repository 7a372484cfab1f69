//! Integration tests for `HttpTokenClient` against a local mock server.
//!
//! Each test mounts the upstream endpoints it needs on a `wiremock`
//! server and points every base URL of the client at it.

use hsm_client::{ClientError, Endpoints, ExchangeOutcome, HttpTokenClient, TokenClient};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer) -> HttpTokenClient {
    HttpTokenClient::with_endpoints(Endpoints::single(server.uri())).unwrap()
}

// =========================================================================
// Device authorization
// =========================================================================

#[tokio::test]
async fn test_request_device_authorization_sends_client_id_and_scope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/device/auth"))
        .and(body_string_contains("client_id=hytale-server"))
        .and(body_string_contains("scope=openid+offline+auth%3Aserver"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "dc",
            "user_code": "ABCD",
            "verification_uri": "https://v",
            "expires_in": 600,
            "interval": 5
        })))
        .expect(1)
        .mount(&server)
        .await;

    let auth = client_for(&server)
        .await
        .request_device_authorization()
        .await
        .unwrap();
    assert_eq!(auth.device_code, "dc");
    assert_eq!(auth.expires_in, 600);
}

#[tokio::test]
async fn test_request_device_authorization_bad_status_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/device/auth"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .await
        .request_device_authorization()
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(503));
}

// =========================================================================
// Device-code exchange: the three outcomes
// =========================================================================

#[tokio::test]
async fn test_exchange_device_code_pending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("device_code=dc"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "authorization_pending"})),
        )
        .mount(&server)
        .await;

    let outcome = client_for(&server).await.exchange_device_code("dc").await;
    assert!(matches!(outcome, ExchangeOutcome::Pending));
}

#[tokio::test]
async fn test_exchange_device_code_other_oauth_error_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "access_denied"})))
        .mount(&server)
        .await;

    let outcome = client_for(&server).await.exchange_device_code("dc").await;
    assert!(matches!(
        outcome,
        ExchangeOutcome::Fatal(ClientError::OAuth { .. })
    ));
}

#[tokio::test]
async fn test_exchange_device_code_success_issues_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Adevice_code",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at",
            "refresh_token": "rt",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;

    let ExchangeOutcome::Done(session) = client_for(&server).await.exchange_device_code("dc").await
    else {
        panic!("expected a session");
    };
    assert_eq!(session.access_token, "at");
    assert_eq!(session.refresh_token(), Some("rt"));
    assert!(session.expires_at.is_some());
}

// =========================================================================
// Refresh and game sessions
// =========================================================================

#[tokio::test]
async fn test_refresh_access_token_invalid_grant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .await
        .refresh_access_token("rt")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::OAuth { .. }));
}

#[tokio::test]
async fn test_create_game_session_posts_profile_uuid_with_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/game-session/new"))
        .and(header("authorization", "Bearer at"))
        .and(body_json(json!({"uuid": "profile-1"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "sessionToken": "st",
            "identityToken": "it",
            "expiresAt": "2030-01-01T00:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = client_for(&server)
        .await
        .create_game_session("at", "profile-1")
        .await
        .unwrap();
    assert_eq!(session.session_token, "st");
    assert_eq!(session.identity_token, "it");
}

#[tokio::test]
async fn test_create_game_session_malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/game-session/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .await
        .create_game_session("at", "profile-1")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Decode(_)));
}

#[tokio::test]
async fn test_delete_game_session_accepts_no_content() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/game-session"))
        .and(header("authorization", "Bearer st"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .await
        .delete_game_session("st")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_game_session_surfaces_status() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/game-session"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .await
        .delete_game_session("st")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert!(err.to_string().contains("boom"));
}

#[tokio::test]
async fn test_delete_game_session_truncated_error_body_is_unavailable() {
    // Promises 100 body bytes, sends 5, then hangs up.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;
        let response = b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 100\r\n\r\nshort";
        socket.write_all(response).await.unwrap();
        let _ = socket.shutdown().await;
    });

    let client =
        HttpTokenClient::with_endpoints(Endpoints::single(format!("http://{addr}"))).unwrap();
    let err = client.delete_game_session("st").await.unwrap_err();
    assert!(err.is_unavailable(), "got {err:?}");
}

#[tokio::test]
async fn test_signed_url_and_release_manifest() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/game-assets/version/release.json"))
        .and(header("authorization", "Bearer at"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"url": format!("{}/signed/manifest", server.uri())})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/signed/manifest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "download_url": "builds/server-1.zip",
            "version": "1.0.0"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let signed = client.signed_url("at", "version/release.json").await.unwrap();
    let manifest = client.release_manifest(&signed.url).await.unwrap();
    assert_eq!(manifest.download_url, "builds/server-1.zip");
    assert_eq!(manifest.version.as_deref(), Some("1.0.0"));
}

#[tokio::test]
async fn test_unreachable_upstream_is_unavailable() {
    // Nothing listens on the discard port.
    let client = HttpTokenClient::with_endpoints(Endpoints::single("http://127.0.0.1:9")).unwrap();
    let err = client.profiles("at").await.unwrap_err();
    assert!(err.is_unavailable());
}
