//! Multi-tenant game sessions for hsm.
//!
//! Every authenticated subject gets the illusion of a private game
//! session, all backed by the one profile the [`SessionCache`] manages.
//!
//! # How it fits in the stack
//!
//! ```text
//! HTTP handlers (above)  ← resolve a Subject from the bearer token
//!     ↕
//! Tenant layer (this crate)  ← Subject → at most one GameSession
//!     ↕
//! Session layer (below)  ← create/refresh/delete with the cached access token
//! ```
//!
//! [`SessionCache`]: hsm_session::SessionCache

mod sessions;

pub use sessions::TenantSessions;
