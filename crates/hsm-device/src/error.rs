use hsm_client::ClientError;

/// Ways a device flow can end without a session.
#[derive(Debug, thiserror::Error)]
pub enum DeviceFlowError {
    /// The device-authorization request itself failed.
    #[error("device authorization request failed: {0}")]
    Initiate(#[source] ClientError),

    /// A token exchange failed with something other than "pending".
    #[error("token exchange failed: {0}")]
    Exchange(#[source] ClientError),

    /// The device code's lifetime ran out before the user authorized it.
    #[error("device code expired after {attempts} exchange attempts")]
    Expired { attempts: u32 },

    /// The caller cancelled the flow.
    #[error("device flow cancelled")]
    Cancelled,
}

impl DeviceFlowError {
    /// True for the two deadline/cancellation outcomes.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Expired { .. } | Self::Cancelled)
    }
}
