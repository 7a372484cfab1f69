use hsm_protocol::ProtocolError;
use serde::Deserialize;
use std::fmt;

/// Errors that can occur talking to the identity provider or the
/// game-session API.
///
/// Two families: [`ClientError::Unavailable`] means we never got an
/// answer (connection refused, TLS failure, the 30 s timeout), everything
/// else means we got an answer we could not use.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport failure or timeout.
    #[error("provider unavailable: {0}")]
    Unavailable(#[source] reqwest::Error),

    /// The upstream answered with a status we do not accept.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The body did not have the expected shape.
    #[error(transparent)]
    Decode(#[from] ProtocolError),

    /// The provider answered with an OAuth error object.
    #[error("oauth error {code}{}", suffix(.description))]
    OAuth {
        code: OAuthErrorCode,
        description: Option<String>,
    },
}

impl ClientError {
    /// True if the failure happened before an upstream answer arrived.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// The upstream HTTP status, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn suffix(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

/// The `error` member of an OAuth 2.0 error response (RFC 6749 §5.2,
/// RFC 8628 §3.5), decoded into a closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthErrorCode {
    /// The user has not finished authorizing the device yet.
    AuthorizationPending,
    SlowDown,
    AccessDenied,
    ExpiredToken,
    InvalidGrant,
    Other(String),
}

impl OAuthErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::AuthorizationPending => "authorization_pending",
            Self::SlowDown => "slow_down",
            Self::AccessDenied => "access_denied",
            Self::ExpiredToken => "expired_token",
            Self::InvalidGrant => "invalid_grant",
            Self::Other(code) => code,
        }
    }
}

impl From<&str> for OAuthErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "authorization_pending" => Self::AuthorizationPending,
            "slow_down" => Self::SlowDown,
            "access_denied" => Self::AccessDenied,
            "expired_token" => Self::ExpiredToken,
            "invalid_grant" => Self::InvalidGrant,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for OAuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire shape of an OAuth error body.
#[derive(Debug, Deserialize)]
pub(crate) struct OAuthErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl OAuthErrorBody {
    /// Decode `body` as an OAuth error object; `None` if it is not one.
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str::<Self>(body)
            .ok()
            .filter(|b| !b.error.is_empty())
    }

    pub fn into_error(self) -> ClientError {
        ClientError::OAuth {
            code: OAuthErrorCode::from(self.error.as_str()),
            description: self.error_description.filter(|d| !d.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_error_code_from_known_strings() {
        assert_eq!(
            OAuthErrorCode::from("authorization_pending"),
            OAuthErrorCode::AuthorizationPending
        );
        assert_eq!(OAuthErrorCode::from("slow_down"), OAuthErrorCode::SlowDown);
        assert_eq!(
            OAuthErrorCode::from("server_error"),
            OAuthErrorCode::Other("server_error".into())
        );
    }

    #[test]
    fn test_oauth_error_body_parse_rejects_non_oauth_json() {
        assert!(OAuthErrorBody::parse(r#"{"message":"nope"}"#).is_none());
        assert!(OAuthErrorBody::parse("<html>").is_none());
    }

    #[test]
    fn test_oauth_error_display_includes_description() {
        let err = OAuthErrorBody::parse(
            r#"{"error":"access_denied","error_description":"user said no"}"#,
        )
        .unwrap()
        .into_error();
        assert_eq!(err.to_string(), "oauth error access_denied: user said no");
    }
}
