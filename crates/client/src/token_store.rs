//! Persistence for the access/refresh token pair

use crate::error::ClientError;
use crate::events::{AuthEvent, AuthEvents};
use apimart_core::TokenSet;
use async_trait::async_trait;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Where the current token pair lives
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Current tokens, or `None` when signed out
    async fn load(&self) -> Result<Option<TokenSet>, ClientError>;

    async fn save(&self, tokens: &TokenSet) -> Result<(), ClientError>;

    async fn clear(&self) -> Result<(), ClientError>;

    async fn is_logged_in(&self) -> bool {
        matches!(self.load().await, Ok(Some(_)))
    }

    /// Publish `TokensCleared` on `events` when the tokens are removed by
    /// someone other than this process. Stores that cannot be shared return
    /// `None`.
    fn watch(&self, _events: &AuthEvents) -> Result<Option<TokenWatch>, ClientError> {
        Ok(None)
    }
}

/// A running watch on shared token storage; dropping it stops the watch
pub struct TokenWatch {
    _watcher: Mutex<RecommendedWatcher>,
}

/// In-process store; tokens are lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<Option<TokenSet>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: TokenSet) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<TokenSet>, ClientError> {
        Ok(self
            .tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn save(&self, tokens: &TokenSet) -> Result<(), ClientError> {
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = Some(tokens.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), ClientError> {
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// JSON file store shared by every client pointed at the same state directory.
///
/// The file is re-read on every load, so a logout performed by another
/// process is observed on the next request.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn store_error(action: &str, path: &Path, err: impl std::fmt::Display) -> ClientError {
    ClientError::TokenStore(format!("failed to {action} {}: {err}", path.display()))
}

/// Write `content` to a new file that only its owner can read
async fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(content).await?;
    file.sync_all().await
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<TokenSet>, ClientError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(store_error("read", &self.path, e)),
        };

        match serde_json::from_str::<TokenSet>(&content) {
            Ok(tokens) if !tokens.access_token.is_empty() => Ok(Some(tokens)),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable token file");
                Ok(None)
            }
        }
    }

    async fn save(&self, tokens: &TokenSet) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| store_error("create", parent, e))?;
        }

        let content = serde_json::to_vec_pretty(tokens)?;
        let temp = self.temp_path();
        write_private(&temp, &content)
            .await
            .map_err(|e| store_error("write", &temp, e))?;

        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| store_error("replace", &self.path, e))?;
        debug!(path = %self.path.display(), "Saved tokens");
        Ok(())
    }

    async fn clear(&self) -> Result<(), ClientError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Cleared tokens");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(store_error("remove", &self.path, e)),
        }
    }

    /// Watch the token file's directory so a logout by another process
    /// reaches this one without waiting for the next request.
    fn watch(&self, events: &AuthEvents) -> Result<Option<TokenWatch>, ClientError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let Some(file_name) = self.path.file_name().map(|n| n.to_os_string()) else {
            return Ok(None);
        };
        std::fs::create_dir_all(&dir).map_err(|e| store_error("create", &dir, e))?;

        let path = self.path.clone();
        let events = events.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Token file watch error");
                    return;
                }
            };
            if !event
                .paths
                .iter()
                .any(|p| p.file_name() == Some(file_name.as_os_str()))
            {
                return;
            }
            if !path.exists() {
                debug!(path = %path.display(), "Token file removed");
                events.publish(AuthEvent::TokensCleared);
            }
        })
        .map_err(|e| store_error("watch", &dir, e))?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| store_error("watch", &dir, e))?;

        Ok(Some(TokenWatch {
            _watcher: Mutex::new(watcher),
        }))
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use mockall::mock;

    mock! {
        pub TokenStore {}

        #[async_trait]
        impl TokenStore for TokenStore {
            async fn load(&self) -> Result<Option<TokenSet>, ClientError>;
            async fn save(&self, tokens: &TokenSet) -> Result<(), ClientError>;
            async fn clear(&self) -> Result<(), ClientError>;
            async fn is_logged_in(&self) -> bool;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryTokenStore::new();
        assert!(!store.is_logged_in().await);

        store.save(&TokenSet::new("A1", "R1")).await.unwrap();
        assert!(store.is_logged_in().await);
        assert_eq!(store.load().await.unwrap().unwrap().access_token, "A1");

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("tokens.json");

        FileTokenStore::new(&path)
            .save(&TokenSet::new("A1", "R1"))
            .await
            .unwrap();

        let other = FileTokenStore::new(&path);
        let tokens = other.load().await.unwrap().unwrap();
        assert_eq!(tokens, TokenSet::new("A1", "R1"));

        other.clear().await.unwrap();
        assert!(FileTokenStore::new(&path).load().await.unwrap().is_none());
        // Clearing twice is fine
        other.clear().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_store_is_private_to_owner() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        // A stale temp file with wide permissions must not be reused
        std::fs::write(dir.path().join("tokens.json.tmp"), "old").unwrap();
        std::fs::set_permissions(
            dir.path().join("tokens.json.tmp"),
            std::fs::Permissions::from_mode(0o644),
        )
        .unwrap();

        FileTokenStore::new(&path)
            .save(&TokenSet::new("A1", "R1"))
            .await
            .unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn removal_by_another_store_is_published() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let ours = FileTokenStore::new(&path);
        ours.save(&TokenSet::new("A1", "R1")).await.unwrap();

        let events = AuthEvents::new();
        let mut rx = events.subscribe();
        let _watch = ours.watch(&events).unwrap().unwrap();

        FileTokenStore::new(&path).clear().await.unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("no event before timeout")
            .unwrap();
        assert_eq!(event, AuthEvent::TokensCleared);
    }

    #[tokio::test]
    async fn memory_store_has_nothing_to_watch() {
        let store = MemoryTokenStore::new();
        assert!(store.watch(&AuthEvents::new()).unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_ignores_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileTokenStore::new(&path);
        assert!(store.load().await.unwrap().is_none());
        assert!(!store.is_logged_in().await);
    }

    #[tokio::test]
    async fn file_store_uses_cookie_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = FileTokenStore::new(&path);
        store.save(&TokenSet::new("A1", "R1")).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["access_token"], "A1");
        assert_eq!(raw["refresh_token"], "R1");
        assert_eq!(raw["token_type"], "Bearer");
    }
}
