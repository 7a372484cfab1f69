//! # hsm
//!
//! Game-session credential service.
//!
//! hsm holds one OAuth session for a game account, keeps it refreshed,
//! and hands out short-lived game sessions (a session token plus an
//! identity token) to whoever needs to start a dedicated server. It runs
//! in one of two modes:
//!
//! - **single-tenant** → one operator, sessions are not tracked
//! - **multi-tenant** → every request carries a JWT; each subject owns at
//!   most one tracked game session
//!
//! ## Layers
//!
//! | Crate          | Role                                              |
//! |----------------|---------------------------------------------------|
//! | `hsm-protocol` | Wire and persisted data types                     |
//! | `hsm-client`   | HTTPS client for the identity provider / session API |
//! | `hsm-device`   | Device authorization flow (`hsm login`)           |
//! | `hsm-session`  | Persisted OAuth session with background refresh   |
//! | `hsm-tenant`   | Subject → game session map                        |
//! | `hsm-auth`     | JWKS-backed bearer gate                           |
//! | `hsm` (this)   | HTTP surface and unified [`HsmError`]             |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hsm::prelude::*;
//!
//! # async fn serve() -> Result<(), HsmError> {
//! let client = Arc::new(HttpTokenClient::new().map_err(ClientError::Unavailable)?);
//! let cache = SessionCache::initialize(client, SessionStore::default(), SessionConfig::default()).await?;
//! let cache = Arc::new(cache);
//!
//! let server = HsmServer::builder().bind("0.0.0.0:8080").build(Arc::clone(&cache)).await?;
//! server.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! cache.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod download;
mod error;
mod handler;
mod server;

pub use download::{Download, PATCHLINE_RELEASE, resolve_download};
pub use error::HsmError;
pub use server::{HsmServer, HsmServerBuilder, VERSION};

pub use hsm_auth as auth;
pub use hsm_client as client;
pub use hsm_device as device;
pub use hsm_protocol as protocol;
pub use hsm_session as session;
pub use hsm_tenant as tenant;

/// Everything a binary embedding hsm usually needs.
pub mod prelude {
    pub use crate::{Download, HsmError, HsmServer, HsmServerBuilder, resolve_download};
    pub use hsm_auth::{
        AuthError, AuthGate, Authenticator, JwtAuthenticator, KeySet, KeySetConfig, KeySetError,
    };
    pub use hsm_client::{ClientError, Endpoints, HttpTokenClient, TokenClient};
    pub use hsm_device::{DeviceFlow, DeviceFlowError, FlowState};
    pub use hsm_protocol::{DeviceAuthorization, GameSession, OAuthSession, Profile, Subject};
    pub use hsm_session::{RefreshOutcome, SessionCache, SessionConfig, SessionError, SessionStore};
    pub use hsm_tenant::TenantSessions;
}
