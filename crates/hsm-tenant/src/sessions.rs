//! The subject → game session map.
//!
//! # Concurrency note
//!
//! The map sits behind a single `tokio::sync::RwLock`. Every mutating
//! operation holds the write guard for its whole duration, including the
//! outbound call to create, refresh or delete. That serializes all tenant
//! churn through one critical section, across subjects as well as within
//! one, and guarantees at most one in-flight creation at any time. `get`
//! only takes the read guard and never calls out.
//!
//! Expired entries are not swept. One is replaced the next time its subject
//! asks for a session and removed on delete, so the map holds one entry per
//! subject seen since startup until then.

use std::collections::HashMap;
use std::sync::Arc;

use hsm_client::TokenClient;
use hsm_protocol::{GameSession, Subject};
use hsm_session::{SessionCache, SessionError};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Tracks at most one [`GameSession`] per [`Subject`].
pub struct TenantSessions<C: TokenClient> {
    cache: Arc<SessionCache<C>>,

    /// A subject has at most ONE tracked session (key invariant). Entries
    /// are only ever replaced or removed, never appended to.
    sessions: RwLock<HashMap<Subject, GameSession>>,
}

impl<C: TokenClient> TenantSessions<C> {
    pub fn new(cache: Arc<SessionCache<C>>) -> Self {
        Self {
            cache,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// The session cache backing every tenant.
    pub fn cache(&self) -> &Arc<SessionCache<C>> {
        &self.cache
    }

    /// Return a usable game session for `subject`.
    ///
    /// An unexpired tracked session is refreshed and the refreshed one
    /// replaces it. If there is none, it has expired, or the refresh
    /// fails, the stale entry is discarded and a brand-new session is
    /// created and tracked.
    ///
    /// # Errors
    /// Only the creation error; a failed refresh falls through to
    /// creation.
    pub async fn get_or_create(&self, subject: &Subject) -> Result<GameSession, SessionError> {
        let mut sessions = self.sessions.write().await;

        let active = sessions
            .get(subject)
            .filter(|existing| existing.is_active(OffsetDateTime::now_utc()))
            .map(|existing| existing.session_token.clone());

        if let Some(session_token) = active {
            match self.cache.refresh_game_session(&session_token).await {
                Ok(refreshed) => {
                    debug!(%subject, "game session refreshed");
                    sessions.insert(subject.clone(), refreshed.clone());
                    return Ok(refreshed);
                }
                Err(e) => {
                    warn!(%subject, error = %e, "game session refresh failed, creating a new one");
                }
            }
        }

        sessions.remove(subject);
        let created = self.cache.create_game_session().await?;
        sessions.insert(subject.clone(), created.clone());
        info!(%subject, tenants = sessions.len(), "game session created");
        Ok(created)
    }

    /// The tracked session for `subject`, if any. No network call and no
    /// implicit refresh.
    pub async fn get(&self, subject: &Subject) -> Option<GameSession> {
        self.sessions.read().await.get(subject).cloned()
    }

    /// Refresh the tracked session for `subject`.
    ///
    /// Returns `Ok(None)` when nothing is tracked. On failure the tracked
    /// entry is left as it was.
    pub async fn refresh(&self, subject: &Subject) -> Result<Option<GameSession>, SessionError> {
        let mut sessions = self.sessions.write().await;
        let Some(session_token) = sessions.get(subject).map(|s| s.session_token.clone()) else {
            return Ok(None);
        };

        let refreshed = self.cache.refresh_game_session(&session_token).await?;
        sessions.insert(subject.clone(), refreshed.clone());
        debug!(%subject, "game session refreshed");
        Ok(Some(refreshed))
    }

    /// End the tracked session for `subject`.
    ///
    /// Returns `Ok(false)` when nothing was tracked. If the upstream
    /// delete fails the entry stays tracked so the caller can retry.
    pub async fn delete(&self, subject: &Subject) -> Result<bool, SessionError> {
        let mut sessions = self.sessions.write().await;
        let Some(session_token) = sessions.get(subject).map(|s| s.session_token.clone()) else {
            return Ok(false);
        };

        self.cache.delete_game_session(&session_token).await?;
        sessions.remove(subject);
        info!(%subject, tenants = sessions.len(), "game session deleted");
        Ok(true)
    }

    /// Number of tracked subjects.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Every subject with a tracked session, in no particular order.
    pub async fn subjects(&self) -> Vec<Subject> {
        self.sessions.read().await.keys().cloned().collect()
    }
}
