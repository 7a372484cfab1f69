//! Resolving the signed download URL of a server release.
//!
//! Two signed-URL hops: the patchline's version manifest first, then the
//! artifact the manifest names.

use hsm_client::TokenClient;
use hsm_session::SessionCache;
use serde::Serialize;
use tracing::debug;

use crate::HsmError;

/// The default patchline.
pub const PATCHLINE_RELEASE: &str = "release";

/// A resolved, ready-to-fetch release artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Download {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Resolve the signed download URL for `patchline`.
pub async fn resolve_download<C: TokenClient>(
    cache: &SessionCache<C>,
    patchline: &str,
) -> Result<Download, HsmError> {
    let manifest_url = cache.signed_url(&format!("version/{patchline}.json")).await?;
    let manifest = cache.client().release_manifest(&manifest_url.url).await?;
    debug!(patchline, version = ?manifest.version, "release manifest fetched");

    let artifact = cache.signed_url(&manifest.download_url).await?;
    Ok(Download {
        url: artifact.url,
        version: manifest.version,
    })
}
