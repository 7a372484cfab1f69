//! On-disk persistence of the OAuth session.
//!
//! One JSON file, readable only by its owner. Writes go to a sibling
//! temporary file first and are renamed over the target, so a reader
//! (or a crash mid-write) never sees a torn file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use hsm_protocol::OAuthSession;
use tokio::io::AsyncWriteExt;

use crate::SessionError;

/// File permissions for the session file (owner read/write).
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;
/// Permissions for a created parent directory.
#[cfg(unix)]
const DIR_MODE: u32 = 0o755;

/// Where the OAuth session lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.config/hsm/session.json`, or `./session.json` when there is no
    /// home directory.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".config").join("hsm").join("session.json"))
            .unwrap_or_else(|| PathBuf::from("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted session.
    ///
    /// # Errors
    /// - [`SessionError::Missing`]: the file does not exist
    /// - [`SessionError::Corrupt`]: it does not decode, or has no access token
    /// - [`SessionError::Store`]: any other I/O failure
    pub async fn load(&self) -> Result<OAuthSession, SessionError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SessionError::Missing {
                    path: self.path.clone(),
                });
            }
            Err(e) => return Err(SessionError::Store(e)),
        };

        OAuthSession::from_json(&bytes).map_err(|source| SessionError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Atomically replace the persisted session.
    pub async fn save(&self, session: &OAuthSession) -> Result<(), SessionError> {
        let bytes = session.to_json().map_err(|source| SessionError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            let mut dir = tokio::fs::DirBuilder::new();
            dir.recursive(true);
            #[cfg(unix)]
            dir.mode(DIR_MODE);
            dir.create(parent).await?;
        }

        let tmp = self.temp_path();
        if let Err(e) = write_private(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::debug!(path = %self.path.display(), "session persisted");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "session.json".into());
        self.path.with_file_name(format!(".{name}.tmp"))
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

async fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(FILE_MODE);

    let mut file = options.open(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}
