use std::time::Duration;

/// Configuration for the session cache.
///
/// `SessionConfig::default()` gives the production values; the builder
/// setters override one field at a time.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// A session expiring within this window of now is refreshed.
    ///
    /// Default: 5 minutes.
    pub refresh_threshold: Duration,

    /// How often the background task checks the session.
    ///
    /// Default: 1 minute.
    pub refresh_interval: Duration,

    /// How long [`shutdown`](crate::SessionCache::shutdown) waits for an
    /// in-flight refresh to finish before aborting the task.
    ///
    /// Default: 10 seconds.
    pub shutdown_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_threshold: Duration::from_secs(5 * 60),
            refresh_interval: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}
