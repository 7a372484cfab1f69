//! HTTP handlers for the session API.
//!
//! Every session route behaves differently per mode:
//!
//! - **multi-tenant** (an authentication gate is installed) → the request's
//!   [`Subject`] keys a tracked game session in [`TenantSessions`]
//! - **single-tenant** → sessions are not tracked; callers hold the session
//!   token themselves and pass it back as `?token=`
//!
//! | Route                   | Multi-tenant             | Single-tenant                 |
//! |-------------------------|--------------------------|-------------------------------|
//! | `POST /session`         | get or create            | create                        |
//! | `POST /session/env`     | same, env-file body      | same, env-file body           |
//! | `GET /session`          | tracked session or 404   | 501                           |
//! | `POST /session/refresh` | refresh tracked or 404   | refresh `?token=` (400 if absent) |
//! | `DELETE /session`       | delete tracked           | delete `?token=` (400 if absent)  |

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use hsm_client::TokenClient;
use hsm_protocol::{GameSession, Subject};
use hsm_session::SessionCache;
use hsm_tenant::TenantSessions;
use serde::{Deserialize, Serialize};

use crate::HsmError;
use crate::download::{Download, PATCHLINE_RELEASE, resolve_download};

/// Shared state behind every handler.
pub(crate) struct AppState<C: TokenClient> {
    pub(crate) cache: Arc<SessionCache<C>>,
    /// `Some` iff the server runs multi-tenant.
    pub(crate) tenants: Option<TenantSessions<C>>,
    pub(crate) version: &'static str,
}

type AppStateRef<C> = State<Arc<AppState<C>>>;

/// Who a session request is for.
enum Caller<'a, C: TokenClient> {
    Tenant(&'a TenantSessions<C>, Subject),
    Single(&'a SessionCache<C>),
}

impl<C: TokenClient> AppState<C> {
    fn caller(&self, subject: Option<Extension<Subject>>) -> Result<Caller<'_, C>, HsmError> {
        match (&self.tenants, subject) {
            (Some(tenants), Some(Extension(subject))) => Ok(Caller::Tenant(tenants, subject)),
            (Some(_), None) => Err(HsmError::Unauthorized),
            (None, _) => Ok(Caller::Single(&self.cache)),
        }
    }

    async fn obtain(&self, subject: Option<Extension<Subject>>) -> Result<GameSession, HsmError> {
        let session = match self.caller(subject)? {
            Caller::Tenant(tenants, subject) => tenants.get_or_create(&subject).await?,
            Caller::Single(cache) => cache.create_game_session().await?,
        };
        Ok(session)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenQuery {
    token: Option<String>,
}

impl TokenQuery {
    fn require(self) -> Result<String, HsmError> {
        self.token
            .filter(|t| !t.is_empty())
            .ok_or(HsmError::MissingParameter("token"))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PatchlineQuery {
    patchline: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Health {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct Message {
    message: &'static str,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

pub(crate) async fn health<C: TokenClient>(State(state): AppStateRef<C>) -> Json<Health> {
    Json(Health {
        status: "healthy",
        version: state.version,
    })
}

pub(crate) async fn ready<C: TokenClient>(State(state): AppStateRef<C>) -> Json<Health> {
    Json(Health {
        status: "ready",
        version: state.version,
    })
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

pub(crate) async fn create_session<C: TokenClient>(
    State(state): AppStateRef<C>,
    subject: Option<Extension<Subject>>,
) -> Result<Json<GameSession>, HsmError> {
    Ok(Json(state.obtain(subject).await?))
}

pub(crate) async fn create_session_env<C: TokenClient>(
    State(state): AppStateRef<C>,
    subject: Option<Extension<Subject>>,
) -> Result<impl IntoResponse, HsmError> {
    let session = state.obtain(subject).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain")], session.to_env()))
}

pub(crate) async fn get_session<C: TokenClient>(
    State(state): AppStateRef<C>,
    subject: Option<Extension<Subject>>,
) -> Result<Json<GameSession>, HsmError> {
    match state.caller(subject)? {
        Caller::Tenant(tenants, subject) => tenants
            .get(&subject)
            .await
            .map(Json)
            .ok_or(HsmError::NoSession),
        Caller::Single(_) => Err(HsmError::NotAvailable),
    }
}

pub(crate) async fn refresh_session<C: TokenClient>(
    State(state): AppStateRef<C>,
    subject: Option<Extension<Subject>>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<GameSession>, HsmError> {
    let session = match state.caller(subject)? {
        Caller::Tenant(tenants, subject) => tenants
            .refresh(&subject)
            .await?
            .ok_or(HsmError::NoSession)?,
        Caller::Single(cache) => cache.refresh_game_session(&query.require()?).await?,
    };
    Ok(Json(session))
}

pub(crate) async fn delete_session<C: TokenClient>(
    State(state): AppStateRef<C>,
    subject: Option<Extension<Subject>>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<Message>, HsmError> {
    match state.caller(subject)? {
        // Nothing tracked is already the desired end state.
        Caller::Tenant(tenants, subject) => {
            tenants.delete(&subject).await?;
        }
        Caller::Single(cache) => cache.delete_game_session(&query.require()?).await?,
    }
    Ok(Json(Message { message: "deleted" }))
}

// ---------------------------------------------------------------------------
// Downloads
// ---------------------------------------------------------------------------

pub(crate) async fn download_url<C: TokenClient>(
    State(state): AppStateRef<C>,
    Query(query): Query<PatchlineQuery>,
) -> Result<Json<Download>, HsmError> {
    let patchline = query
        .patchline
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| PATCHLINE_RELEASE.to_string());
    Ok(Json(resolve_download(&state.cache, &patchline).await?))
}
