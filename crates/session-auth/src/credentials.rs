//! Session credential storage
//!
//! Persists the captured session cookie and the time it was saved in a small
//! JSON file (`{"cookie": "...", "savedAt": <unix millis>}`) so later runs can
//! skip the login handshake. Writes go through a temp file + rename so a crash
//! or a concurrent run never leaves a torn file behind; the last writer wins.
//!
//! Loading is deliberately soft: a missing, unreadable or corrupt file is the
//! same as having no cached session, which sends the caller down the login
//! path instead of aborting the run.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Opaque session credential (the `Cookie` header value).
///
/// Never parsed or inspected beyond emptiness. Redacted in `Debug`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "SessionToken(<empty>)")
        } else {
            write!(f, "SessionToken([REDACTED])")
        }
    }
}

/// A session token together with the time it was persisted.
///
/// `saved_at` is a unix timestamp in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    #[serde(rename = "cookie")]
    pub token: SessionToken,
    #[serde(rename = "savedAt")]
    pub saved_at: u64,
}

/// File-backed store for a single session credential.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the cached credential, if any.
    ///
    /// Returns `None` when the file is absent, unreadable or does not parse.
    /// None of these conditions is an error for the caller.
    pub async fn load(&self) -> Option<StoredCredential> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no cached credential");
                return None;
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "credential file unreadable, ignoring"
                );
                return None;
            }
        };

        match serde_json::from_str::<StoredCredential>(&contents) {
            Ok(credential) => {
                debug!(
                    path = %self.path.display(),
                    saved_at = credential.saved_at,
                    "loaded cached credential"
                );
                Some(credential)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "credential file corrupt, ignoring");
                None
            }
        }
    }

    /// Persist `token` with the current time, replacing any prior content.
    ///
    /// Returns the credential that was written. Write failures are fatal.
    pub async fn save(&self, token: &SessionToken) -> Result<StoredCredential> {
        let credential = StoredCredential {
            token: token.clone(),
            saved_at: now_millis(),
        };
        write_atomic(&self.path, &credential).await?;
        info!(path = %self.path.display(), "saved session credential");
        Ok(credential)
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Write the credential to a file atomically with 0600 permissions.
async fn write_atomic(path: &Path, credential: &StoredCredential) -> Result<()> {
    let json = serde_json::to_string_pretty(credential)
        .map_err(|e| Error::CredentialParse(format!("serializing credential: {e}")))?;

    // A bare file name has an empty parent, which means the working directory
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Io(format!("credential path {} has no file name", path.display())))?
        .to_string_lossy();

    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    if let Err(e) = write_and_rename(&tmp_path, path, json.as_bytes()).await {
        // Best effort, the write error is the one reported
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    debug!(path = %path.display(), "persisted credential");
    Ok(())
}

async fn write_and_rename(tmp_path: &Path, path: &Path, contents: &[u8]) -> Result<()> {
    tokio::fs::write(tmp_path, contents)
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))
}
