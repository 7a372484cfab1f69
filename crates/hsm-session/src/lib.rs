//! Process-wide OAuth session management for hsm.
//!
//! This crate owns the one OAuth session a running hsm holds:
//!
//! 1. **Persistence**: reading and atomically writing the session file
//!    ([`SessionStore`])
//! 2. **Caching**: the committed session behind a read/write lock, the
//!    active profile, and a background task refreshing ahead of expiry
//!    ([`SessionCache`])
//! 3. **Game sessions**: create/refresh/delete pass-throughs that always
//!    use the most recently committed access token
//!
//! # How it fits in the stack
//!
//! ```text
//! Tenant layer (above)  ← one game session per authenticated subject
//!     ↕
//! Session layer (this crate)  ← one OAuth session per process
//!     ↕
//! Client layer (below)  ← HTTPS calls to the identity provider / session API
//! ```

mod cache;
mod config;
mod error;
mod store;

pub use cache::{RefreshOutcome, SessionCache};
pub use config::SessionConfig;
pub use error::SessionError;
pub use store::SessionStore;
