//! Error types for the session layer.

use std::path::PathBuf;

use hsm_client::ClientError;
use hsm_protocol::ProtocolError;

/// Errors that can occur loading, refreshing or using the process-wide
/// OAuth session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No persisted session exists. A device login has to happen first.
    #[error("no session at {}; run `hsm login` first", path.display())]
    Missing { path: PathBuf },

    /// The persisted file exists but is not a usable session.
    #[error("session file {} is unusable: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: ProtocolError,
    },

    /// The session is at or near expiry and could not be refreshed:
    /// either there is no refresh token, or redeeming it failed.
    #[error("session expired and could not be refreshed")]
    Expired {
        #[source]
        source: Option<ClientError>,
    },

    /// The account has no game profile to create sessions for.
    #[error("account has no game profiles")]
    NoProfiles,

    /// Reading or writing the session file failed.
    #[error("session store: {0}")]
    Store(#[from] std::io::Error),

    /// The upstream call failed.
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl SessionError {
    /// True if the failure was the upstream not answering at all.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Client(e) => e.is_unavailable(),
            Self::Expired { source: Some(e) } => e.is_unavailable(),
            _ => false,
        }
    }
}
