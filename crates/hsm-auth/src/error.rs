//! Error types for the authentication gate.

use std::path::PathBuf;

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

/// Why a request was not given a subject.
///
/// The `Display` text is what the caller sees in the `401` body, so it
/// never carries key material or decoder internals. Those stay on the
/// `source` chain for logging.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No `Authorization` header, or a scheme other than `Bearer`.
    #[error("missing or invalid authorization header")]
    MissingBearer,

    /// The token is malformed, expired, not yet valid, or its signature
    /// does not verify against any candidate key.
    #[error("invalid token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),

    /// No key in the set matches the token's `kid`, even after a re-fetch.
    #[error("invalid token")]
    NoMatchingKey { kid: Option<String> },

    /// The token verified but carries no (or an empty) `sub` claim.
    #[error("missing subject")]
    MissingSubject,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

/// Failures fetching the verification key set.
#[derive(Debug, thiserror::Error)]
pub enum KeySetError {
    #[error("failed to read CA certificate {}", path.display())]
    CaCertRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CA certificate {} is not valid PEM", path.display())]
    CaCertInvalid {
        path: PathBuf,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read bearer token file {}", path.display())]
    BearerTokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build key set HTTP client")]
    Client(#[source] reqwest::Error),

    /// The endpoint could not be reached (connect, TLS, or timeout).
    #[error("key set endpoint unreachable")]
    Unavailable(#[source] reqwest::Error),

    #[error("key set endpoint answered {status}")]
    Status { status: u16 },

    #[error("key set response is not a JWKS document")]
    Decode(#[source] reqwest::Error),
}
