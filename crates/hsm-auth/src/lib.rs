//! Bearer authentication for multi-tenant hsm.
//!
//! Every protected request must carry `Authorization: Bearer <jwt>`. The
//! token is verified against a JWKS key set fetched from a configured
//! endpoint; its `sub` claim becomes the [`Subject`](hsm_protocol::Subject)
//! that owns a game session in the tenant layer.
//!
//! ```text
//! request ──→ require_subject ──→ AuthGate::check ──→ JwtAuthenticator
//!                  │                                        │
//!                  ▼                                        ▼
//!        extensions ∋ Subject                     KeySet (cached JWKS)
//! ```
//!
//! Every rejection is a `401` with `WWW-Authenticate: Bearer` and a
//! `{"error": …}` body; see [`AuthError`].

mod error;
mod gate;
mod jwt;
mod keyset;

pub use error::{AuthError, KeySetError};
pub use gate::{AuthGate, bearer_token, require_subject};
pub use jwt::{Authenticator, JwtAuthenticator};
pub use keyset::{KeySet, KeySetConfig, VerificationKey};
