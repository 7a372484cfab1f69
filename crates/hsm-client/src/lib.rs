//! Client boundary to the identity provider and the game-session API.
//!
//! Provides the [`TokenClient`] trait that every stateful component in
//! hsm talks through, and [`HttpTokenClient`], its HTTPS implementation.
//!
//! The client holds no token state: every call takes the credential it
//! needs explicitly (a refresh token, an access token, a session token).
//! Which token is current is the session cache's business, not ours.
//!
//! # Feature Flags
//!
//! - `mock`: [`MockTokenClient`], a scripted in-memory implementation
//!   used by the other crates' tests.

mod error;
mod http;
#[cfg(feature = "mock")]
mod mock;

pub use error::{ClientError, OAuthErrorCode};
pub use http::{
    CLIENT_ID, DEVICE_CODE_GRANT, Endpoints, HttpTokenClient, REQUEST_TIMEOUT, SCOPE,
};
#[cfg(feature = "mock")]
pub use mock::MockTokenClient;

use std::future::Future;

use hsm_protocol::{
    DeviceAuthorization, GameSession, OAuthSession, ProfileList, ReleaseManifest, SignedUrl,
};

/// Result of one device-code token exchange.
///
/// Only [`ExchangeOutcome::Pending`] is a retry signal; the poll loop
/// never inspects the error inside `Fatal`.
#[derive(Debug)]
pub enum ExchangeOutcome {
    /// The user authorized the device; here is the session.
    Done(OAuthSession),
    /// The user has not finished authorizing yet.
    Pending,
    /// Anything else: network, decode, non-pending OAuth error, bad status.
    Fatal(ClientError),
}

/// Request/response contract with the identity provider and the
/// game-session API.
///
/// # Trait bounds
///
/// - `Send + Sync` → one client is shared by the session cache, its
///   background refresh task and every HTTP handler.
/// - `'static` → it lives as long as the server.
///
/// Every method returns a `Send` future so callers can be spawned onto
/// the Tokio runtime.
pub trait TokenClient: Send + Sync + 'static {
    /// Start a device-authorization grant.
    fn request_device_authorization(
        &self,
    ) -> impl Future<Output = Result<DeviceAuthorization, ClientError>> + Send;

    /// Exchange a device code for tokens, once.
    fn exchange_device_code(
        &self,
        device_code: &str,
    ) -> impl Future<Output = ExchangeOutcome> + Send;

    /// Redeem a refresh token. The returned session carries whatever
    /// refresh token the provider sent, which may be none.
    fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<OAuthSession, ClientError>> + Send;

    /// List the game profiles on the account.
    fn profiles(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<ProfileList, ClientError>> + Send;

    /// Create a new game session for `profile_id`.
    fn create_game_session(
        &self,
        access_token: &str,
        profile_id: &str,
    ) -> impl Future<Output = Result<GameSession, ClientError>> + Send;

    /// Extend a game session.
    fn refresh_game_session(
        &self,
        session_token: &str,
    ) -> impl Future<Output = Result<GameSession, ClientError>> + Send;

    /// End a game session.
    fn delete_game_session(
        &self,
        session_token: &str,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Fetch a pre-signed URL for the release artifact at `path`
    /// (for example `version/release.json`).
    fn signed_url(
        &self,
        access_token: &str,
        path: &str,
    ) -> impl Future<Output = Result<SignedUrl, ClientError>> + Send;

    /// Fetch the release manifest a signed URL points at. The URL is its
    /// own authorization, so no credential is attached.
    fn release_manifest(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<ReleaseManifest, ClientError>> + Send;
}
