use anyhow::{Context, Result};
use hsm::resolve_download;
use hsm::session::SessionStore;

use super::open_cache;
use crate::cli::DownloadUrlArgs;

pub async fn run(store: SessionStore, args: &DownloadUrlArgs) -> Result<()> {
    let cache = open_cache(store).await?;
    let download = resolve_download(&cache, &args.patchline).await;
    cache.shutdown().await;

    let download = download
        .with_context(|| format!("Failed to resolve download for patchline {}", args.patchline))?;
    if let Some(version) = &download.version {
        eprintln!("Version: {version}");
    }
    println!("{}", download.url);
    Ok(())
}
