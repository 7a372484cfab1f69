//! The session cache: one authoritative OAuth session per process.
//!
//! It's responsible for:
//! - Loading the persisted session at startup (and refreshing it then if
//!   it is about to expire)
//! - Picking the profile every game session is created for
//! - Refreshing the session ahead of expiry on a background task
//! - Handing the current access token to every outbound call
//!
//! # Concurrency note
//!
//! The session sits behind one `tokio::sync::RwLock`. Token lookups take
//! the read lock; a refresh does its network round trip with no lock held
//! and takes the write lock only to install the result. A caller may
//! therefore use a token that is about to be replaced, never one that was
//! not yet committed. Refreshes themselves are serialized by a separate
//! gate so the background task and an explicit call never redeem the same
//! refresh token twice.

use std::sync::{Arc, Mutex};

use hsm_client::TokenClient;
use hsm_protocol::{GameSession, OAuthSession, Profile, SignedUrl};
use hsm_tick::{PeriodicTask, TickConfig};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{SessionConfig, SessionError, SessionStore};

/// What one refresh check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The cached session is not near expiry; nothing changed.
    Fresh,
    /// The persisted file held a newer, valid session and it was adopted.
    Reloaded,
    /// The session was refreshed with its refresh token and persisted.
    Refreshed,
}

struct Inner<C: TokenClient> {
    client: Arc<C>,
    store: SessionStore,
    config: SessionConfig,
    session: RwLock<OAuthSession>,
    profile: Profile,
    refresh_gate: tokio::sync::Mutex<()>,
}

/// Owns the process's OAuth session and its background refresh task.
///
/// ## Lifecycle
///
/// ```text
/// initialize() ──→ [refresh task ticking every refresh_interval] ──→ shutdown()
///      │                          │
///      ▼                          ▼
///  load + refresh           refresh_if_needed()
///  + pick profile
/// ```
pub struct SessionCache<C: TokenClient> {
    inner: Arc<Inner<C>>,
    refresh_task: Mutex<Option<PeriodicTask>>,
}

impl<C: TokenClient> SessionCache<C> {
    /// Load the persisted session, make sure it is usable, pick the active
    /// profile and start the background refresh task.
    ///
    /// # Errors
    /// - [`SessionError::Missing`] / [`SessionError::Corrupt`]: no usable file
    /// - [`SessionError::Expired`]: near expiry and not refreshable
    /// - [`SessionError::NoProfiles`]: the account has no profile
    /// - [`SessionError::Client`]: the profile listing failed
    pub async fn initialize(
        client: Arc<C>,
        store: SessionStore,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let mut session = store.load().await?;

        if session.needs_refresh(config.refresh_threshold, OffsetDateTime::now_utc()) {
            info!(
                expires_at = ?session.expires_at,
                "persisted session near expiry, refreshing"
            );
            let refresh_token = session
                .refresh_token()
                .ok_or(SessionError::Expired { source: None })?;
            let refreshed = client
                .refresh_access_token(refresh_token)
                .await
                .map_err(|e| SessionError::Expired { source: Some(e) })?
                .with_refresh_fallback(&session);
            store.save(&refreshed).await?;
            session = refreshed;
        }

        // First profile wins.
        let profiles = client.profiles(&session.access_token).await?;
        let profile = profiles
            .profiles
            .into_iter()
            .next()
            .ok_or(SessionError::NoProfiles)?;
        info!(profile = %profile.uuid, username = %profile.username, "session ready");

        let inner = Arc::new(Inner {
            client,
            store,
            config,
            session: RwLock::new(session),
            profile,
            refresh_gate: tokio::sync::Mutex::new(()),
        });

        let task_inner = Arc::clone(&inner);
        let tick = TickConfig::every(inner.config.refresh_interval);
        let task = PeriodicTask::spawn("session-refresh", tick, move |info| {
            let inner = Arc::clone(&task_inner);
            async move {
                match inner.refresh_if_needed().await {
                    Ok(RefreshOutcome::Fresh) => {}
                    Ok(outcome) => info!(tick = info.tick, ?outcome, "background refresh"),
                    // The stale session stays in place; the next tick retries.
                    Err(e) => warn!(tick = info.tick, error = %e, "background refresh failed"),
                }
            }
        });

        Ok(Self {
            inner,
            refresh_task: Mutex::new(Some(task)),
        })
    }

    /// One check of the background loop. See [`RefreshOutcome`].
    ///
    /// # Errors
    /// On failure the previously committed session stays in memory,
    /// except for [`SessionError::Store`]: the refreshed session is
    /// already installed and only persisting it failed.
    pub async fn refresh_if_needed(&self) -> Result<RefreshOutcome, SessionError> {
        self.inner.refresh_if_needed().await
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The most recently committed access token.
    pub async fn access_token(&self) -> String {
        self.inner.session.read().await.access_token.clone()
    }

    /// A snapshot of the committed session.
    pub async fn session(&self) -> OAuthSession {
        self.inner.session.read().await.clone()
    }

    /// The profile every game session is created for.
    pub fn profile(&self) -> &Profile {
        &self.inner.profile
    }

    pub fn profile_id(&self) -> &str {
        &self.inner.profile.uuid
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn client(&self) -> &Arc<C> {
        &self.inner.client
    }

    // -----------------------------------------------------------------------
    // Pass-throughs
    // -----------------------------------------------------------------------

    /// Create a game session for the active profile.
    pub async fn create_game_session(&self) -> Result<GameSession, SessionError> {
        let access_token = self.access_token().await;
        let session = self
            .inner
            .client
            .create_game_session(&access_token, self.profile_id())
            .await?;
        debug!(expires_at = %session.expires_at, "game session created");
        Ok(session)
    }

    pub async fn refresh_game_session(
        &self,
        session_token: &str,
    ) -> Result<GameSession, SessionError> {
        Ok(self.inner.client.refresh_game_session(session_token).await?)
    }

    pub async fn delete_game_session(&self, session_token: &str) -> Result<(), SessionError> {
        Ok(self.inner.client.delete_game_session(session_token).await?)
    }

    /// A pre-signed URL for the release artifact at `path`.
    pub async fn signed_url(&self, path: &str) -> Result<SignedUrl, SessionError> {
        let access_token = self.access_token().await;
        Ok(self.inner.client.signed_url(&access_token, path).await?)
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Stop the background refresh task, waiting up to
    /// `config.shutdown_timeout` for an in-flight refresh to finish.
    ///
    /// Returns `true` if the task stopped in time. Calling it again is a
    /// no-op that returns `true`.
    pub async fn shutdown(&self) -> bool {
        let task = self
            .refresh_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match task {
            Some(task) => task.shutdown(self.inner.config.shutdown_timeout).await,
            None => true,
        }
    }
}

impl<C: TokenClient> Inner<C> {
    async fn refresh_if_needed(&self) -> Result<RefreshOutcome, SessionError> {
        let _gate = self.refresh_gate.lock().await;
        let threshold = self.config.refresh_threshold;

        let current = {
            let session = self.session.read().await;
            if !session.needs_refresh(threshold, OffsetDateTime::now_utc()) {
                return Ok(RefreshOutcome::Fresh);
            }
            session.clone()
        };

        // Another `hsm login` may have written a newer session.
        let base = match self.store.load().await {
            Ok(persisted) if !persisted.needs_refresh(threshold, OffsetDateTime::now_utc()) => {
                *self.session.write().await = persisted;
                return Ok(RefreshOutcome::Reloaded);
            }
            Ok(persisted) => persisted,
            Err(e) => {
                debug!(error = %e, "could not reload persisted session, using cached one");
                current
            }
        };

        let refreshed = self.redeem(&base).await?;
        *self.session.write().await = refreshed.clone();
        self.store.save(&refreshed).await?;

        info!(expires_at = ?refreshed.expires_at, "session refreshed");
        Ok(RefreshOutcome::Refreshed)
    }

    async fn redeem(&self, base: &OAuthSession) -> Result<OAuthSession, SessionError> {
        let refresh_token = base
            .refresh_token()
            .ok_or(SessionError::Expired { source: None })?;
        let refreshed = self.client.refresh_access_token(refresh_token).await?;
        Ok(refreshed.with_refresh_fallback(base))
    }
}
