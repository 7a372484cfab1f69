use std::sync::Arc;

use anyhow::{Context, Result};
use hsm::auth::{Authenticator, JwtAuthenticator, KeySet, KeySetConfig};
use hsm::client::HttpTokenClient;
use hsm::session::{SessionCache, SessionStore};
use hsm::{HsmServer, HsmServerBuilder};
use tracing::info;

use super::open_cache;
use crate::cli::ServeArgs;

pub async fn run(store: SessionStore, args: &ServeArgs) -> Result<()> {
    let keys = load_keys(args).await?;

    let cache = Arc::new(open_cache(store).await?);
    let builder = HsmServer::builder()
        .bind(format!("0.0.0.0:{}", args.port))
        .public_paths(args.public_paths.iter().cloned());

    let served = match keys {
        Some(keys) => serve(builder.authenticator(JwtAuthenticator::new(keys)), &cache).await,
        None => serve(builder, &cache).await,
    };

    if !cache.shutdown().await {
        tracing::warn!("session refresh task did not stop in time");
    }
    served
}

async fn serve<A: Authenticator>(
    builder: HsmServerBuilder<A>,
    cache: &Arc<SessionCache<HttpTokenClient>>,
) -> Result<()> {
    let server = builder
        .build(Arc::clone(cache))
        .await
        .context("Failed to bind listener")?;
    server.run(shutdown_signal()).await?;
    Ok(())
}

/// Key-set settings from the flags, or `None` in single-tenant mode.
fn key_set_config(args: &ServeArgs) -> Option<KeySetConfig> {
    let mut config = KeySetConfig::new(args.jwks_endpoint.clone()?);
    if let Some(path) = &args.jwks_ca_cert {
        config = config.with_ca_cert(path.clone());
    }
    if let Some(path) = &args.jwks_jwt_token_file {
        config = config.with_bearer_token_file(path.clone());
    }
    Some(config)
}

/// Fetch the key set up front; a failure aborts startup.
async fn load_keys(args: &ServeArgs) -> Result<Option<KeySet>> {
    let Some(config) = key_set_config(args) else {
        info!("single-tenant mode");
        return Ok(None);
    };

    let endpoint = config.url.clone();
    let keys = KeySet::fetch(config)
        .await
        .with_context(|| format!("Failed to load key set from {endpoint}"))?;
    let key_count = keys.len().await;
    info!(%endpoint, keys = key_count, "multi-tenant mode");
    Ok(Some(keys))
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
