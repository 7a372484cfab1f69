//! HTTPS implementation of [`TokenClient`] using `reqwest`.

use std::time::Duration;

use hsm_protocol::{
    DeviceAuthorization, GameSession, OAuthSession, ProfileList, ProtocolError, ReleaseManifest,
    SignedUrl, TokenResponse,
};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use time::OffsetDateTime;

use crate::error::OAuthErrorBody;
use crate::{ClientError, ExchangeOutcome, OAuthErrorCode, TokenClient};

/// OAuth client identifier hsm presents to the identity provider.
pub const CLIENT_ID: &str = "hytale-server";
/// Scopes requested by the device-authorization grant.
pub const SCOPE: &str = "openid offline auth:server";
/// RFC 8628 grant type for the device-code exchange.
pub const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
/// Client-wide timeout applied to every request. No request is retried.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Base URLs of the three upstream services.
///
/// Overridable so tests can point the client at a local mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub oauth: String,
    pub account_data: String,
    pub sessions: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            oauth: "https://oauth.accounts.hytale.com".into(),
            account_data: "https://account-data.hytale.com".into(),
            sessions: "https://sessions.hytale.com".into(),
        }
    }
}

impl Endpoints {
    /// Every service at the same base URL (handy with a single mock server).
    pub fn single(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            oauth: base.clone(),
            account_data: base.clone(),
            sessions: base,
        }
    }
}

fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// A [`TokenClient`] over HTTPS (rustls).
#[derive(Debug, Clone)]
pub struct HttpTokenClient {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl HttpTokenClient {
    /// Builds a client for the production endpoints.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_endpoints(Endpoints::default())
    }

    /// Builds a client for custom endpoints, with the standard timeout.
    pub fn with_endpoints(endpoints: Endpoints) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, endpoints })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<Response, ClientError> {
        send(
            self.http
                .post(join(&self.endpoints.oauth, "/oauth2/token"))
                .form(form),
        )
        .await
    }
}

async fn send(request: RequestBuilder) -> Result<Response, ClientError> {
    request.send().await.map_err(ClientError::Unavailable)
}

/// Read the body and decode it if the status is one of `accepted`.
async fn read_json<T: DeserializeOwned>(
    response: Response,
    accepted: &[StatusCode],
) -> Result<T, ClientError> {
    let status = response.status();
    let body = response.text().await.map_err(ClientError::Unavailable)?;
    if !accepted.contains(&status) {
        return Err(ClientError::Status {
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(|e| ClientError::Decode(ProtocolError::Decode(e)))
}

/// Decode a token endpoint response into a freshly issued session.
///
/// Non-200 bodies are decoded as OAuth error objects when they are one.
async fn read_token(response: Response) -> Result<OAuthSession, ClientError> {
    let status = response.status();
    let body = response.text().await.map_err(ClientError::Unavailable)?;
    if status != StatusCode::OK {
        return Err(match OAuthErrorBody::parse(&body) {
            Some(oauth) => oauth.into_error(),
            None => ClientError::Status {
                status: status.as_u16(),
                body,
            },
        });
    }
    let token: TokenResponse =
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(ProtocolError::Decode(e)))?;
    if token.access_token.is_empty() {
        return Err(ProtocolError::MissingField("access_token").into());
    }
    Ok(OAuthSession::issue(token, OffsetDateTime::now_utc()))
}

impl TokenClient for HttpTokenClient {
    async fn request_device_authorization(&self) -> Result<DeviceAuthorization, ClientError> {
        let response = send(
            self.http
                .post(join(&self.endpoints.oauth, "/oauth2/device/auth"))
                .form(&[("client_id", CLIENT_ID), ("scope", SCOPE)]),
        )
        .await?;
        let authorization: DeviceAuthorization =
            read_json(response, &[StatusCode::OK, StatusCode::CREATED]).await?;
        if authorization.device_code.is_empty() {
            return Err(ProtocolError::MissingField("device_code").into());
        }
        tracing::debug!(
            expires_in = authorization.expires_in,
            interval = authorization.interval,
            "device authorization issued"
        );
        Ok(authorization)
    }

    async fn exchange_device_code(&self, device_code: &str) -> ExchangeOutcome {
        let response = match self
            .token_request(&[
                ("grant_type", DEVICE_CODE_GRANT),
                ("device_code", device_code),
                ("client_id", CLIENT_ID),
            ])
            .await
        {
            Ok(response) => response,
            Err(e) => return ExchangeOutcome::Fatal(e),
        };

        match read_token(response).await {
            Ok(session) => ExchangeOutcome::Done(session),
            Err(ClientError::OAuth {
                code: OAuthErrorCode::AuthorizationPending,
                ..
            }) => ExchangeOutcome::Pending,
            Err(e) => ExchangeOutcome::Fatal(e),
        }
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<OAuthSession, ClientError> {
        tracing::debug!("redeeming refresh token");
        let response = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", CLIENT_ID),
            ])
            .await?;
        read_token(response).await
    }

    async fn profiles(&self, access_token: &str) -> Result<ProfileList, ClientError> {
        let response = send(
            self.http
                .get(join(&self.endpoints.account_data, "/my-account/get-profiles"))
                .bearer_auth(access_token),
        )
        .await?;
        read_json(response, &[StatusCode::OK]).await
    }

    async fn create_game_session(
        &self,
        access_token: &str,
        profile_id: &str,
    ) -> Result<GameSession, ClientError> {
        let response = send(
            self.http
                .post(join(&self.endpoints.sessions, "/game-session/new"))
                .bearer_auth(access_token)
                .json(&serde_json::json!({ "uuid": profile_id })),
        )
        .await?;
        read_json(response, &[StatusCode::OK, StatusCode::CREATED]).await
    }

    async fn refresh_game_session(&self, session_token: &str) -> Result<GameSession, ClientError> {
        let response = send(
            self.http
                .post(join(&self.endpoints.sessions, "/game-session/refresh"))
                .bearer_auth(session_token),
        )
        .await?;
        read_json(response, &[StatusCode::OK]).await
    }

    async fn delete_game_session(&self, session_token: &str) -> Result<(), ClientError> {
        let response = send(
            self.http
                .delete(join(&self.endpoints.sessions, "/game-session"))
                .bearer_auth(session_token),
        )
        .await?;
        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::NO_CONTENT {
            return Ok(());
        }
        let body = response.text().await.map_err(ClientError::Unavailable)?;
        Err(ClientError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn signed_url(&self, access_token: &str, path: &str) -> Result<SignedUrl, ClientError> {
        let response = send(
            self.http
                .get(join(
                    &self.endpoints.account_data,
                    &format!("/game-assets/{}", path.trim_start_matches('/')),
                ))
                .bearer_auth(access_token),
        )
        .await?;
        read_json(response, &[StatusCode::OK]).await
    }

    async fn release_manifest(&self, url: &str) -> Result<ReleaseManifest, ClientError> {
        tracing::debug!("fetching release manifest");
        let response = send(self.http.get(url)).await?;
        read_json(response, &[StatusCode::OK]).await
    }
}
