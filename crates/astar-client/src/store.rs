use std::path::{Path, PathBuf};

use astar_core::Credentials;
use serde::{Deserialize, Serialize};

use crate::{ClientError, Result};

// ─── SessionStore ─────────────────────────────────────────────────────────

/// What is persisted between CLI invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    /// Base URL of the server that issued the credentials.
    pub server: String,
    pub credentials: Credentials,
}

/// Persists the current session on disk so later commands can reuse it.
///
/// The session lives at `<dir>/session.json`, written atomically and, on
/// Unix, readable only by the owner. The directory is created lazily on the
/// first `save`.
///
/// ```rust,ignore
/// let store = SessionStore::new(&home.join(".astar"));
/// if let Some(stored) = store.load() {
///     session.login(stored.credentials);
/// }
/// ```
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: &Path) -> Self {
        SessionStore {
            dir: dir.to_path_buf(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("session.json")
    }

    /// The stored session, or `None` if absent or unreadable.
    pub fn load(&self) -> Option<StoredSession> {
        let data = std::fs::read_to_string(self.path()).ok()?;
        match serde_json::from_str(&data) {
            Ok(stored) => Some(stored),
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path().display(), "ignoring corrupt session file");
                None
            }
        }
    }

    pub fn save(&self, session: &StoredSession) -> Result<()> {
        let data = serde_json::to_vec_pretty(session)?;
        let path = self.path();
        astar_core::io::atomic_write(&path, &data)?;
        restrict_permissions(&path)?;
        Ok(())
    }

    /// Delete the stored session (no-op if none exists).
    pub fn clear(&self) -> Result<()> {
        let p = self.path();
        if p.exists() {
            std::fs::remove_file(&p).map_err(ClientError::from)?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn stored() -> StoredSession {
        StoredSession {
            server: "http://localhost:8080".into(),
            credentials: Credentials {
                access_token: "a".into(),
                refresh_token: "r".into(),
                token_type: "Bearer".into(),
                expires_at: Utc::now(),
            },
        }
    }

    #[test]
    fn load_returns_none_when_absent() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        assert!(store.load().is_none());
    }

    #[test]
    fn save_creates_dir_and_loads_back() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(&dir.path().join("nested"));
        let session = stored();
        store.save(&session).unwrap();
        assert_eq!(store.load().unwrap(), session);
    }

    #[test]
    fn clear_removes_file_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        store.save(&stored()).unwrap();
        store.clear().unwrap();
        assert!(store.load().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn corrupt_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn session_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        store.save(&stored()).unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
