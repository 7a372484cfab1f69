//! Shared data model for hsm.
//!
//! This crate defines the values that travel between the identity
//! provider, the game-session API, the persisted session file and the
//! HTTP surface:
//!
//! - **Credentials** ([`OAuthSession`], [`TokenResponse`],
//!   [`DeviceAuthorization`]): what the identity provider hands out.
//! - **Game sessions** ([`GameSession`]): the short-lived token pair a
//!   game server instance runs with.
//! - **Account data** ([`Profile`], [`ProfileList`], [`SignedUrl`],
//!   [`ReleaseManifest`]).
//! - **Identity** ([`Subject`]): who an inbound request belongs to.
//! - **Errors** ([`ProtocolError`]): what can go wrong decoding them.
//!
//! # Architecture
//!
//! The protocol layer knows nothing about HTTP, locks or files. It only
//! knows the shapes and the time arithmetic attached to them
//! (expiry derivation, "needs refresh").
//!
//! ```text
//! Client (HTTPS) → Protocol (typed values) → Session cache / Tenant cache
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod error;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use error::ProtocolError;
pub use types::{
    DEFAULT_POLL_INTERVAL, DeviceAuthorization, GameSession, MAX_POLL_INTERVAL, OAuthSession,
    Profile, ProfileList, ReleaseManifest, SignedUrl, Subject, TokenResponse,
};
