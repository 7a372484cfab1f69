//! OAuth 2.0 device-authorization flow (RFC 8628) for hsm.
//!
//! The flow is a small state machine:
//!
//! ```text
//! Initiated → Polling → Authorized
//!                     → Expired    (device code lifetime elapsed)
//!                     → Cancelled  (caller's CancellationToken fired)
//!                     → Failed     (any exchange error other than "pending")
//! ```
//!
//! Only "authorization pending" is retried. Everything else ends the
//! flow on the spot and is returned to the caller.

mod error;
mod flow;

pub use error::DeviceFlowError;
pub use flow::{DeviceFlow, FlowState};
