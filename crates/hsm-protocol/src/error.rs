//! Error types for the protocol layer.
//!
//! Each crate in hsm defines its own error enum. A `ProtocolError`
//! always means "the bytes did not have the shape we expected", never a
//! network or locking problem.

/// Errors that can occur while decoding or encoding transfer objects.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into JSON).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, wrong types, or a
    /// truncated body.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The JSON decoded, but a field that must carry a value was empty.
    #[error("missing field: {0}")]
    MissingField(&'static str),
}
