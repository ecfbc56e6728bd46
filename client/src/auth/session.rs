//! Session credentials and their on-disk cache

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::AuthResult;

/// Sessions are refreshed this many seconds before they actually expire
const EXPIRY_LEEWAY_SECS: i64 = 30;

/// Signed-in member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Credential issued by the auth server
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds) the access token expires at
    pub expires_at: i64,
    pub user: SessionUser,
}

impl Session {
    /// Whether the access token is expired, or about to be, at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() + EXPIRY_LEEWAY_SECS >= self.expires_at
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// JSON file holding the current session between runs
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the cached session
    ///
    /// A missing file means no session. An unreadable cache is discarded.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SessionStore` if the file exists but cannot be read
    pub async fn load(&self) -> AuthResult<Option<Session>> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&contents) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!("Discarding unreadable session cache {}: {e}", self.path.display());
                self.clear().await?;
                Ok(None)
            }
        }
    }

    /// Writes `session` to the cache file
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SessionStore` if the file cannot be written
    pub async fn save(&self, session: &Session) -> AuthResult<()> {
        let contents = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(&self.path, contents).await?;

        debug!("Cached session in {}", self.path.display());
        Ok(())
    }

    /// Removes the cache file if present
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SessionStore` if the file exists but cannot be removed
    pub async fn clear(&self) -> AuthResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session(expires_at: i64) -> Session {
        Session {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at,
            user: SessionUser {
                id: "user-1".to_string(),
                email: Some("ole@example.com".to_string()),
            },
        }
    }

    #[test]
    fn test_expiry_includes_leeway() {
        let now = Utc.timestamp_opt(1_000, 0).unwrap();

        assert!(session(1_000).is_expired(now));
        assert!(session(1_020).is_expired(now));
        assert!(!session(1_100).is_expired(now));
    }

    #[test]
    fn test_debug_hides_tokens() {
        let rendered = format!("{:?}", session(0));
        assert!(!rendered.contains("access"));
        assert!(!rendered.contains("refresh"));
        assert!(rendered.contains("user-1"));
    }

    #[tokio::test]
    async fn test_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));

        assert_eq!(store.load().await.unwrap(), None);

        store.save(&session(42)).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(session(42)));

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        tokio::fs::write(store.path(), b"{not json").await.unwrap();

        assert_eq!(store.load().await.unwrap(), None);
        assert!(!store.path().exists());
    }
}
