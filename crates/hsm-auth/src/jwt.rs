//! Turning a bearer token into a [`Subject`].

use std::future::Future;

use hsm_protocol::Subject;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde::Deserialize;
use tracing::debug;

use crate::{AuthError, KeySet};

/// Resolves a bearer token to the subject it was issued for.
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(&self, token: &str) -> impl Future<Output = Result<Subject, AuthError>> + Send;
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
}

/// Verifies JWTs against a [`KeySet`].
///
/// - the header `kid` picks the key; a token without one is tried against
///   every signing key
/// - the key's declared algorithm is the only one accepted
/// - `exp` and `nbf` are enforced when present; `aud` is not checked
pub struct JwtAuthenticator {
    keys: KeySet,
}

impl JwtAuthenticator {
    pub fn new(keys: KeySet) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &KeySet {
        &self.keys
    }
}

fn validation(algorithm: Algorithm) -> Validation {
    let mut validation = Validation::new(algorithm);
    validation.required_spec_claims.clear();
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.validate_aud = false;
    validation
}

impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Subject, AuthError> {
        let header = decode_header(token).map_err(AuthError::InvalidToken)?;
        let candidates = self.keys.candidates(header.kid.as_deref()).await;

        let mut last_error = None;
        for candidate in &candidates {
            let algorithm = candidate.algorithm.unwrap_or(header.alg);
            match decode::<Claims>(token, &candidate.key, &validation(algorithm)) {
                Ok(data) => {
                    let sub = data.claims.sub.filter(|s| !s.is_empty());
                    return sub.map(Subject::new).ok_or(AuthError::MissingSubject);
                }
                Err(e) => {
                    debug!(kid = ?candidate.kid, error = %e, "token rejected by key");
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => AuthError::InvalidToken(e),
            None => AuthError::NoMatchingKey { kid: header.kid },
        })
    }
}
