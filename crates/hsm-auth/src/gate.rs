//! The axum side of authentication: pull the bearer token off the
//! request, resolve it, and hand the [`Subject`] to handlers through
//! request extensions.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use hsm_protocol::Subject;
use tracing::debug;

use crate::{AuthError, Authenticator};

/// An [`Authenticator`] plus the paths that bypass it.
pub struct AuthGate<A> {
    authenticator: A,
    public_paths: HashSet<String>,
}

impl<A: Authenticator> AuthGate<A> {
    pub fn new(authenticator: A) -> Self {
        Self {
            authenticator,
            public_paths: HashSet::new(),
        }
    }

    /// Paths (exact match) served without a token.
    pub fn with_public_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.public_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.contains(path)
    }

    pub fn authenticator(&self) -> &A {
        &self.authenticator
    }

    /// Resolve the subject for a request carrying `headers`.
    pub async fn check(&self, headers: &HeaderMap) -> Result<Subject, AuthError> {
        let token = bearer_token(headers).ok_or(AuthError::MissingBearer)?;
        self.authenticator.authenticate(token).await
    }
}

/// The token of an `Authorization: Bearer <token>` header, if that is what
/// the request carries.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Middleware: public paths pass through untouched; everything else needs
/// a resolvable bearer token, and the [`Subject`] is inserted into the
/// request extensions before the handler runs.
///
/// ```ignore
/// let router = routes.route_layer(middleware::from_fn_with_state(gate, require_subject::<A>));
/// ```
pub async fn require_subject<A: Authenticator>(
    State(gate): State<Arc<AuthGate<A>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if gate.is_public(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let subject = gate.check(request.headers()).await.inspect_err(|e| {
        debug!(path = %request.uri().path(), error = %e, "request rejected");
    })?;

    request.extensions_mut().insert(subject);
    Ok(next.run(request).await)
}
