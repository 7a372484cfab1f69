pub mod download;
pub mod login;
pub mod serve;
pub mod start;

use std::sync::Arc;

use anyhow::{Context, Result};
use hsm::client::HttpTokenClient;
use hsm::session::{SessionCache, SessionConfig, SessionStore};

/// Client against the production identity provider and session API.
pub fn http_client() -> Result<Arc<HttpTokenClient>> {
    let client = HttpTokenClient::new().context("Failed to build HTTP client")?;
    Ok(Arc::new(client))
}

/// Load the persisted OAuth session and start keeping it fresh.
///
/// Every caller must `shutdown()` the returned cache before exiting.
pub async fn open_cache(store: SessionStore) -> Result<SessionCache<HttpTokenClient>> {
    let cache = SessionCache::initialize(http_client()?, store, SessionConfig::default())
        .await
        .context("Failed to load session")?;
    Ok(cache)
}
