//! Unified error type for hsm.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hsm_auth::{AuthError, KeySetError};
use hsm_client::ClientError;
use hsm_device::DeviceFlowError;
use hsm_protocol::ProtocolError;
use hsm_session::SessionError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `hsm` meta-crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
///
/// As an HTTP response it maps to a status code (see [`status`](Self::status))
/// and a `{"error": "<message>"}` body.
#[derive(Debug, thiserror::Error)]
pub enum HsmError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    DeviceFlow(#[from] DeviceFlowError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    KeySet(#[from] KeySetError),

    /// Multi-tenant request that reached a handler without a subject.
    #[error("unauthorized")]
    Unauthorized,

    /// The subject has no tracked game session.
    #[error("no session")]
    NoSession,

    #[error("{0} required")]
    MissingParameter(&'static str),

    /// The operation only exists in multi-tenant mode.
    #[error("not available in single-tenant mode")]
    NotAvailable,

    #[error("server I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl HsmError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth(_) | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NoSession => StatusCode::NOT_FOUND,
            Self::MissingParameter(_) => StatusCode::BAD_REQUEST,
            Self::NotAvailable => StatusCode::NOT_IMPLEMENTED,
            Self::Protocol(_)
            | Self::Client(_)
            | Self::DeviceFlow(_)
            | Self::Session(_)
            | Self::KeySet(_)
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HsmError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            // Keeps the `WWW-Authenticate` challenge.
            Self::Auth(e) => e.into_response(),
            e => {
                if status.is_server_error() {
                    tracing::error!(error = %e, "request failed");
                }
                (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_session_error() {
        let err: HsmError = SessionError::NoProfiles.into();
        assert!(matches!(err, HsmError::Session(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("profiles"));
    }

    #[test]
    fn test_from_auth_error() {
        let err: HsmError = AuthError::MissingBearer.into();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_from_client_error() {
        let err: HsmError = ClientError::Status {
            status: 502,
            body: "bad gateway".into(),
        }
        .into();
        assert!(matches!(err, HsmError::Client(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_request_errors_status() {
        assert_eq!(HsmError::NoSession.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            HsmError::MissingParameter("token").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(HsmError::MissingParameter("token").to_string(), "token required");
        assert_eq!(HsmError::NotAvailable.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_into_response_body() {
        let response = HsmError::NoSession.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "no session" }));
    }
}
