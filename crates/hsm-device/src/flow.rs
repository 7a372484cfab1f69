//! The device flow driver.

use std::sync::Arc;

use hsm_client::{ExchangeOutcome, TokenClient};
use hsm_protocol::{DeviceAuthorization, OAuthSession};
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::DeviceFlowError;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Where a [`DeviceFlow`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// Created; no device code yet, or one was just issued.
    Initiated,
    /// Exchanging the device code at the poll interval.
    Polling,
    Authorized,
    Expired,
    Cancelled,
    Failed,
}

impl FlowState {
    /// Returns `true` once the flow can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Authorized | Self::Expired | Self::Cancelled | Self::Failed
        )
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: FlowState) -> bool {
        match (self, next) {
            (Self::Initiated, Self::Polling | Self::Failed | Self::Cancelled) => true,
            (Self::Polling, next) => next.is_terminal(),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Flow
// ---------------------------------------------------------------------------

/// Drives one device-authorization grant to completion.
///
/// One `DeviceFlow` is good for one login; the state it reports is
/// observable through [`DeviceFlow::subscribe`] while it runs.
pub struct DeviceFlow<C: TokenClient> {
    client: Arc<C>,
    state: watch::Sender<FlowState>,
}

impl<C: TokenClient> DeviceFlow<C> {
    pub fn new(client: Arc<C>) -> Self {
        let (state, _) = watch::channel(FlowState::Initiated);
        Self { client, state }
    }

    /// Current state.
    pub fn state(&self) -> FlowState {
        *self.state.borrow()
    }

    /// Watch state transitions as they happen.
    pub fn subscribe(&self) -> watch::Receiver<FlowState> {
        self.state.subscribe()
    }

    fn transition(&self, next: FlowState) {
        let previous = self.state.send_replace(next);
        if previous.can_transition_to(next) {
            debug!(from = ?previous, to = ?next, "device flow transition");
        } else {
            warn!(from = ?previous, to = ?next, "unexpected device flow transition");
        }
    }

    /// Ask the provider for a device code and user code.
    pub async fn initiate(&self) -> Result<DeviceAuthorization, DeviceFlowError> {
        match self.client.request_device_authorization().await {
            Ok(authorization) => {
                debug!(
                    user_code = %authorization.user_code,
                    expires_in = authorization.expires_in,
                    "device code issued"
                );
                Ok(authorization)
            }
            Err(e) => {
                self.transition(FlowState::Failed);
                Err(DeviceFlowError::Initiate(e))
            }
        }
    }

    /// Exchange the device code until the user authorizes it, the code
    /// expires, or `cancel` fires.
    ///
    /// The first exchange is issued immediately, then one per poll
    /// interval. A pending answer whose next wait would end past the
    /// device code's lifetime ends the flow with
    /// [`DeviceFlowError::Expired`] without issuing another request.
    /// Cancellation interrupts the wait, never an in-flight exchange.
    pub async fn poll(
        &self,
        authorization: &DeviceAuthorization,
        cancel: &CancellationToken,
    ) -> Result<OAuthSession, DeviceFlowError> {
        let interval = authorization.poll_interval();
        // A lifetime past the end of the clock is no deadline at all.
        let deadline = authorization
            .lifetime()
            .and_then(|lifetime| Instant::now().checked_add(lifetime));
        let mut attempts: u32 = 0;

        self.transition(FlowState::Polling);

        loop {
            if cancel.is_cancelled() {
                self.transition(FlowState::Cancelled);
                return Err(DeviceFlowError::Cancelled);
            }

            attempts += 1;
            match self
                .client
                .exchange_device_code(&authorization.device_code)
                .await
            {
                ExchangeOutcome::Done(session) => {
                    self.transition(FlowState::Authorized);
                    info!(attempts, "device authorized");
                    return Ok(session);
                }
                ExchangeOutcome::Fatal(e) => {
                    self.transition(FlowState::Failed);
                    warn!(attempts, error = %e, "device code exchange failed");
                    return Err(DeviceFlowError::Exchange(e));
                }
                ExchangeOutcome::Pending => {
                    debug!(attempts, "authorization pending");
                }
            }

            let Some(next_attempt) = Instant::now()
                .checked_add(interval)
                .filter(|next| deadline.is_none_or(|deadline| *next <= deadline))
            else {
                self.transition(FlowState::Expired);
                return Err(DeviceFlowError::Expired { attempts });
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.transition(FlowState::Cancelled);
                    return Err(DeviceFlowError::Cancelled);
                }
                _ = time::sleep_until(next_attempt) => {}
            }
        }
    }

    /// Initiate, show the prompt, then poll.
    ///
    /// `on_prompt` is called once with the device authorization so the
    /// caller can tell the user where to go and which code to enter.
    pub async fn run<F>(
        &self,
        cancel: &CancellationToken,
        on_prompt: F,
    ) -> Result<OAuthSession, DeviceFlowError>
    where
        F: FnOnce(&DeviceAuthorization),
    {
        let authorization = self.initiate().await?;
        on_prompt(&authorization);
        self.poll(&authorization, cancel).await
    }
}
