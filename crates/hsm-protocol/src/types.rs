//! Core transfer types for hsm.
//!
//! Every type here is something that gets serialized: to the identity
//! provider, from the game-session API, into the persisted session file,
//! or out through the HTTP surface. The serde attributes are part of the
//! contract, so the tests at the bottom pin the exact JSON shapes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use time::OffsetDateTime;

use crate::ProtocolError;

/// Poll interval used when the provider does not send one (or sends 0).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Longest poll interval honoured; larger provider values are capped.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(600);

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The stable identifier of an authenticated caller, taken from a
/// validated JWT's `sub` claim.
///
/// This is a "newtype wrapper" over `String`: a `Subject` can only come
/// from a verified token (or a test), so a raw header value can never be
/// used as a tenant key by accident. It is the key of the tenant map.
///
/// `#[serde(transparent)]` serializes it as the bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subject(String);

impl Subject {
    pub fn new(sub: impl Into<String>) -> Self {
        Self(sub.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Subject {
    fn from(sub: &str) -> Self {
        Self::new(sub)
    }
}

// ---------------------------------------------------------------------------
// OAuth credentials
// ---------------------------------------------------------------------------

/// The body of a successful token endpoint response (device-code
/// exchange or refresh-token grant).
///
/// Only `access_token` is mandatory. Providers routinely omit
/// `refresh_token` on refresh, which is why [`OAuthSession::issue`]
/// never reads this type alone when a previous session exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// The one OAuth session a process holds: access token, refresh token
/// and the derived expiry.
///
/// This is also the persisted file format. Timestamps are RFC 3339 and
/// absent optionals are omitted:
///
/// ```json
/// {
///   "access_token": "at-1",
///   "refresh_token": "rt-1",
///   "token_type": "Bearer",
///   "expires_in": 3600,
///   "expires_at": "2026-10-17T12:00:00Z",
///   "created_at": "2026-10-17T11:00:00Z"
/// }
/// ```
///
/// `expires_at` is always derived from `expires_in` at issuance time
/// (see [`OAuthSession::issue`]); nothing else writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthSession {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Lifetime in seconds as reported by the provider. 0 means unknown.
    #[serde(default)]
    pub expires_in: u64,

    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<OffsetDateTime>,

    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
}

impl OAuthSession {
    /// Build a session from a provider token response received at `now`.
    ///
    /// `created_at = now` and `expires_at = now + expires_in`. A response
    /// without a positive `expires_in` yields a session with no expiry,
    /// which never needs refreshing. Empty strings from the provider are
    /// treated as absent.
    pub fn issue(response: TokenResponse, now: OffsetDateTime) -> Self {
        let expires_in = response.expires_in.unwrap_or(0);
        let expires_at = if expires_in > 0 {
            i64::try_from(expires_in)
                .ok()
                .and_then(|secs| now.checked_add(time::Duration::seconds(secs)))
        } else {
            None
        };

        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
            token_type: response.token_type.filter(|t| !t.is_empty()),
            scope: response.scope.filter(|s| !s.is_empty()),
            expires_in,
            expires_at,
            created_at: Some(now),
        }
    }

    /// Carry `previous`'s refresh token over when the provider did not
    /// rotate it.
    pub fn with_refresh_fallback(mut self, previous: &OAuthSession) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = previous.refresh_token.clone();
        }
        self
    }

    /// True iff the session has an expiry and it falls within
    /// `threshold` of `now`.
    ///
    /// `time::Duration` compares directly against `std::time::Duration`,
    /// and a negative remaining lifetime (already expired) is always
    /// below the threshold.
    pub fn needs_refresh(&self, threshold: Duration, now: OffsetDateTime) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - now < threshold,
            None => false,
        }
    }

    /// The refresh token, if there is a usable one.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Decode a persisted session. A file that decodes but carries no
    /// access token is rejected.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let session: Self = serde_json::from_slice(bytes).map_err(ProtocolError::Decode)?;
        if session.access_token.is_empty() {
            return Err(ProtocolError::MissingField("access_token"));
        }
        Ok(session)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec_pretty(self).map_err(ProtocolError::Encode)
    }
}

/// Response of the device-authorization endpoint.
///
/// Ephemeral: lives for one device flow and is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    /// Lifetime of the device code in seconds. 0 means no deadline.
    #[serde(default)]
    pub expires_in: u64,
    /// Minimum seconds between token exchanges. 0 means "use the default".
    #[serde(default)]
    pub interval: u64,
}

impl DeviceAuthorization {
    pub fn poll_interval(&self) -> Duration {
        if self.interval == 0 {
            DEFAULT_POLL_INTERVAL
        } else {
            Duration::from_secs(self.interval).min(MAX_POLL_INTERVAL)
        }
    }

    /// How long polling may go on, or `None` if the provider gave no lifetime.
    pub fn lifetime(&self) -> Option<Duration> {
        (self.expires_in > 0).then(|| Duration::from_secs(self.expires_in))
    }

    /// The URI to show the user: the complete one when present.
    pub fn prompt_uri(&self) -> &str {
        self.verification_uri_complete
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(&self.verification_uri)
    }
}

// ---------------------------------------------------------------------------
// Game sessions
// ---------------------------------------------------------------------------

/// A live entitlement to run one game server instance.
///
/// The game-session API speaks camelCase:
///
/// ```json
/// { "sessionToken": "st", "identityToken": "it", "expiresAt": "2026-10-17T12:00:00Z" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSession {
    pub session_token: String,
    pub identity_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl GameSession {
    /// Environment variable carrying the session token for the game server.
    pub const SESSION_TOKEN_ENV: &'static str = "HYTALE_SERVER_SESSION_TOKEN";
    /// Environment variable carrying the identity token for the game server.
    pub const IDENTITY_TOKEN_ENV: &'static str = "HYTALE_SERVER_IDENTITY_TOKEN";

    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        now < self.expires_at
    }

    /// The variables a game server process needs, as `(name, value)` pairs.
    pub fn env_vars(&self) -> [(&'static str, &str); 2] {
        [
            (Self::SESSION_TOKEN_ENV, self.session_token.as_str()),
            (Self::IDENTITY_TOKEN_ENV, self.identity_token.as_str()),
        ]
    }

    /// Render in env-file form, one `NAME="value"` line per variable.
    pub fn to_env(&self) -> String {
        self.env_vars()
            .iter()
            .map(|(name, value)| format!("{name}=\"{value}\"\n"))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Account data
// ---------------------------------------------------------------------------

/// One game profile on the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub uuid: String,
    pub username: String,
}

/// Response of the profile listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileList {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

/// A pre-signed URL for a release artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUrl {
    pub url: String,
}

/// The release manifest a signed `version/<patchline>.json` URL points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseManifest {
    pub download_url: String,
    #[serde(default)]
    pub version: Option<String>,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn token_response(expires_in: Option<u64>) -> TokenResponse {
        TokenResponse {
            access_token: "at-1".into(),
            refresh_token: Some("rt-1".into()),
            token_type: Some("Bearer".into()),
            scope: Some("openid offline auth:server".into()),
            expires_in,
            id_token: None,
        }
    }

    // =====================================================================
    // Subject
    // =====================================================================

    #[test]
    fn test_subject_serializes_as_plain_string() {
        let json = serde_json::to_string(&Subject::from("alice")).unwrap();
        assert_eq!(json, "\"alice\"");
        assert_eq!(Subject::from("alice").to_string(), "alice");
    }

    // =====================================================================
    // OAuthSession
    // =====================================================================

    #[test]
    fn test_issue_derives_expiry_from_expires_in() {
        let now = datetime!(2026-10-17 11:00 UTC);
        let session = OAuthSession::issue(token_response(Some(3600)), now);

        assert_eq!(session.expires_at, Some(datetime!(2026-10-17 12:00 UTC)));
        assert_eq!(session.created_at, Some(now));
        assert_eq!(session.refresh_token(), Some("rt-1"));
    }

    #[test]
    fn test_issue_without_lifetime_never_needs_refresh() {
        let now = datetime!(2026-10-17 11:00 UTC);
        let session = OAuthSession::issue(token_response(None), now);

        assert_eq!(session.expires_at, None);
        assert!(!session.needs_refresh(Duration::from_secs(300), now));
    }

    #[test]
    fn test_needs_refresh_inside_threshold() {
        let now = datetime!(2026-10-17 11:00 UTC);
        let session = OAuthSession::issue(token_response(Some(120)), now);
        assert!(session.needs_refresh(Duration::from_secs(300), now));
    }

    #[test]
    fn test_needs_refresh_outside_threshold_is_false() {
        let now = datetime!(2026-10-17 11:00 UTC);
        let session = OAuthSession::issue(token_response(Some(600)), now);
        assert!(!session.needs_refresh(Duration::from_secs(300), now));
    }

    #[test]
    fn test_needs_refresh_already_expired() {
        let issued = datetime!(2026-10-17 11:00 UTC);
        let session = OAuthSession::issue(token_response(Some(60)), issued);
        let later = datetime!(2026-10-17 13:00 UTC);
        assert!(session.needs_refresh(Duration::from_secs(300), later));
    }

    #[test]
    fn test_with_refresh_fallback_keeps_previous_token() {
        let now = datetime!(2026-10-17 11:00 UTC);
        let previous = OAuthSession::issue(token_response(Some(60)), now);

        let mut rotated = token_response(Some(3600));
        rotated.access_token = "at-2".into();
        rotated.refresh_token = Some(String::new());

        let next = OAuthSession::issue(rotated, now).with_refresh_fallback(&previous);
        assert_eq!(next.access_token, "at-2");
        assert_eq!(next.refresh_token(), Some("rt-1"));
    }

    #[test]
    fn test_persisted_format_uses_rfc3339_and_omits_absent_fields() {
        let now = datetime!(2026-10-17 11:00 UTC);
        let mut response = token_response(Some(3600));
        response.scope = None;
        let session = OAuthSession::issue(response, now);

        let value: serde_json::Value =
            serde_json::from_slice(&session.to_json().unwrap()).unwrap();
        assert_eq!(value["expires_at"], "2026-10-17T12:00:00Z");
        assert_eq!(value["created_at"], "2026-10-17T11:00:00Z");
        assert!(value.get("scope").is_none());
    }

    #[test]
    fn test_from_json_rejects_empty_access_token() {
        let err = OAuthSession::from_json(br#"{"access_token":""}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField("access_token")));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = OAuthSession::from_json(b"not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_from_json_accepts_minimal_file() {
        let session = OAuthSession::from_json(br#"{"access_token":"at"}"#).unwrap();
        assert_eq!(session.refresh_token(), None);
        assert_eq!(session.expires_at, None);
    }

    // =====================================================================
    // DeviceAuthorization
    // =====================================================================

    #[test]
    fn test_device_authorization_defaults() {
        let auth: DeviceAuthorization = serde_json::from_str(
            r#"{"device_code":"dc","user_code":"ABCD","verification_uri":"https://v"}"#,
        )
        .unwrap();

        assert_eq!(auth.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert_eq!(auth.lifetime(), None);
        assert_eq!(auth.prompt_uri(), "https://v");
    }

    #[test]
    fn test_device_authorization_prefers_complete_uri() {
        let auth = DeviceAuthorization {
            device_code: "dc".into(),
            user_code: "ABCD".into(),
            verification_uri: "https://v".into(),
            verification_uri_complete: Some("https://v?code=ABCD".into()),
            expires_in: 600,
            interval: 2,
        };
        assert_eq!(auth.prompt_uri(), "https://v?code=ABCD");
        assert_eq!(auth.poll_interval(), Duration::from_secs(2));
        assert_eq!(auth.lifetime(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_device_authorization_caps_huge_interval() {
        let auth = DeviceAuthorization {
            device_code: "dc".into(),
            user_code: "ABCD".into(),
            verification_uri: "https://v".into(),
            verification_uri_complete: None,
            expires_in: 600,
            interval: u64::MAX,
        };
        assert_eq!(auth.poll_interval(), MAX_POLL_INTERVAL);
    }

    // =====================================================================
    // GameSession
    // =====================================================================

    #[test]
    fn test_game_session_json_is_camel_case() {
        let session: GameSession = serde_json::from_str(
            r#"{"sessionToken":"st","identityToken":"it","expiresAt":"2026-10-17T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(session.session_token, "st");
        assert_eq!(session.expires_at, datetime!(2026-10-17 12:00 UTC));
    }

    #[test]
    fn test_game_session_is_active_until_expiry() {
        let session = GameSession {
            session_token: "st".into(),
            identity_token: "it".into(),
            expires_at: datetime!(2026-10-17 12:00 UTC),
        };
        assert!(session.is_active(datetime!(2026-10-17 11:59 UTC)));
        assert!(!session.is_active(datetime!(2026-10-17 12:00 UTC)));
    }

    #[test]
    fn test_game_session_env_form() {
        let session = GameSession {
            session_token: "st".into(),
            identity_token: "it".into(),
            expires_at: datetime!(2026-10-17 12:00 UTC),
        };
        assert_eq!(
            session.to_env(),
            "HYTALE_SERVER_SESSION_TOKEN=\"st\"\nHYTALE_SERVER_IDENTITY_TOKEN=\"it\"\n"
        );
    }
}
