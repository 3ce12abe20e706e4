//! Cached view of the signed-in user
//!
//! `SessionCache` reads through to `GET /users/me`, keeps the result for a
//! configurable TTL and collapses concurrent fetches into one request.

use crate::client::{ApiClient, RequestConfig};
use crate::error::ClientError;
use crate::events::AuthEvent;
use apimart_core::{ClientSettings, User};
use bytes::Bytes;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const ME_PATH: &str = "/users/me";
pub const DEFAULT_USER_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_AVATAR_TTL: Duration = Duration::from_secs(30 * 60);

type UserFetch = Shared<BoxFuture<'static, Result<Option<User>, ClientError>>>;

/// Cached user and when it was fetched
#[derive(Debug, Clone)]
pub struct UserCacheEntry {
    pub user: Option<User>,
    pub is_logged_in: bool,
    pub fetched_at: Instant,
}

impl UserCacheEntry {
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

struct AvatarEntry {
    url: String,
    bytes: Bytes,
    fetched_at: Instant,
}

#[derive(Default)]
struct SessionState {
    entry: Option<UserCacheEntry>,
    in_flight: Option<UserFetch>,
    avatar: Option<AvatarEntry>,
    /// Bumped on every reset; fetches started before a reset do not write back
    epoch: u64,
}

impl SessionState {
    fn reset(&mut self) {
        self.entry = None;
        self.in_flight = None;
        self.avatar = None;
        self.epoch += 1;
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Current-user cache shared by everything that needs to know who is signed in
#[derive(Clone)]
pub struct SessionCache {
    client: ApiClient,
    state: Arc<Mutex<SessionState>>,
    ttl: Duration,
    avatar_ttl: Duration,
}

impl SessionCache {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            state: Arc::new(Mutex::new(SessionState::default())),
            ttl: DEFAULT_USER_TTL,
            avatar_ttl: DEFAULT_AVATAR_TTL,
        }
    }

    pub fn from_settings(client: ApiClient, settings: &ClientSettings) -> Self {
        Self::new(client)
            .with_ttl(settings.user_cache_ttl())
            .with_avatar_ttl(settings.avatar_cache_ttl())
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_avatar_ttl(mut self, ttl: Duration) -> Self {
        self.avatar_ttl = ttl;
        self
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Cached user, fresh or not
    pub fn user(&self) -> Option<User> {
        lock(&self.state).entry.as_ref().and_then(|e| e.user.clone())
    }

    pub fn is_logged_in(&self) -> bool {
        lock(&self.state)
            .entry
            .as_ref()
            .is_some_and(|e| e.is_logged_in)
    }

    pub fn snapshot(&self) -> Option<UserCacheEntry> {
        lock(&self.state).entry.clone()
    }

    /// Whether a `/users/me` fetch is outstanding
    pub fn is_loading(&self) -> bool {
        lock(&self.state).in_flight.is_some()
    }

    /// Current user, fetched when the cache is stale or `force` is set.
    ///
    /// Returns `Ok(None)` when signed out, including when the session expired
    /// during the fetch. Concurrent callers share one request; a forced
    /// refresh joins a fetch that is already running.
    pub async fn refresh_user(&self, force: bool) -> Result<Option<User>, ClientError> {
        if !self.client.tokens().is_logged_in().await {
            lock(&self.state).reset();
            return Ok(None);
        }

        let fetch = {
            let mut state = lock(&self.state);
            if !force {
                if let Some(entry) = state.entry.as_ref().filter(|e| e.is_fresh(self.ttl)) {
                    debug!("Serving user from cache");
                    return Ok(entry.user.clone());
                }
            }

            match &state.in_flight {
                Some(fetch) => fetch.clone(),
                None => {
                    let fetch = self.fetch_user(state.epoch).boxed().shared();
                    state.in_flight = Some(fetch.clone());
                    fetch
                }
            }
        };

        fetch.await
    }

    fn fetch_user(
        &self,
        epoch: u64,
    ) -> impl Future<Output = Result<Option<User>, ClientError>> + Send + 'static {
        let client = self.client.clone();
        let state = Arc::clone(&self.state);
        let avatar_ttl = self.avatar_ttl;

        async move {
            let result = client.get::<User>(ME_PATH, RequestConfig::default()).await;

            let expired = {
                let mut guard = lock(&state);
                if guard.epoch != epoch {
                    debug!("Discarding user fetched before the session was reset");
                    return Ok(None);
                }
                guard.in_flight = None;

                match &result {
                    Ok(user) => {
                        let keep_avatar = guard.avatar.as_ref().is_some_and(|avatar| {
                            user.avatar_url.as_deref() == Some(avatar.url.as_str())
                                && avatar.fetched_at.elapsed() < avatar_ttl
                        });
                        if !keep_avatar {
                            guard.avatar = None;
                        }
                        guard.entry = Some(UserCacheEntry {
                            user: Some(user.clone()),
                            is_logged_in: true,
                            fetched_at: Instant::now(),
                        });
                        false
                    }
                    Err(err) if err.is_auth_expired() => {
                        guard.reset();
                        true
                    }
                    Err(_) => false,
                }
            };

            match result {
                Ok(user) => Ok(Some(user)),
                Err(err) if expired => {
                    debug!(error = %err, "Session expired while fetching user");
                    if client.tokens().is_logged_in().await {
                        if let Err(e) = client.clear_session().await {
                            warn!(error = %e, "Failed to clear tokens");
                        }
                    }
                    Ok(None)
                }
                Err(err) => Err(err),
            }
        }
    }

    /// Sign out locally: drop cached state and stored tokens
    pub async fn clear_user(&self) -> Result<(), ClientError> {
        lock(&self.state).reset();
        self.client.clear_session().await
    }

    /// Drop cached state without touching stored tokens
    pub fn invalidate(&self) {
        lock(&self.state).reset();
    }

    /// Avatar bytes for the cached user, downloaded on first use
    pub async fn avatar(&self) -> Result<Option<Bytes>, ClientError> {
        let url = {
            let state = lock(&self.state);
            let Some(url) = state
                .entry
                .as_ref()
                .and_then(|e| e.user.as_ref())
                .and_then(|u| u.avatar_url.clone())
            else {
                return Ok(None);
            };
            if let Some(avatar) = state
                .avatar
                .as_ref()
                .filter(|a| a.url == url && a.fetched_at.elapsed() < self.avatar_ttl)
            {
                return Ok(Some(avatar.bytes.clone()));
            }
            url
        };

        let bytes = self.client.download(&url).await?;
        debug!(url, size = bytes.len(), "Downloaded avatar");

        let mut state = lock(&self.state);
        let still_current = state
            .entry
            .as_ref()
            .and_then(|e| e.user.as_ref())
            .is_some_and(|u| u.avatar_url.as_deref() == Some(url.as_str()));
        if still_current {
            state.avatar = Some(AvatarEntry {
                url,
                bytes: bytes.clone(),
                fetched_at: Instant::now(),
            });
        }
        Ok(Some(bytes))
    }

    /// Reset the cache whenever any component publishes `TokensCleared`
    pub fn spawn_auth_listener(&self) -> JoinHandle<()> {
        let mut events = self.client.events().subscribe();
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AuthEvent::TokensCleared) => {
                        debug!("Tokens cleared, dropping cached user");
                        lock(&state).reset();
                    }
                    Ok(AuthEvent::TokensUpdated) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth listener lagged, dropping cached user");
                        lock(&state).reset();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_store::MemoryTokenStore;
    use apimart_core::TokenSet;

    fn client(logged_in: bool) -> ApiClient {
        let store = if logged_in {
            MemoryTokenStore::with_tokens(TokenSet::new("A1", "R1"))
        } else {
            MemoryTokenStore::new()
        };
        ApiClient::builder()
            .base_url("http://127.0.0.1:9")
            .token_store(Arc::new(store))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn signed_out_returns_none_without_io() {
        let cache = SessionCache::new(client(false));
        assert_eq!(cache.refresh_user(false).await.unwrap(), None);
        assert!(!cache.is_logged_in());
        assert!(cache.snapshot().is_none());
    }

    #[tokio::test]
    async fn avatar_without_user_is_none() {
        let cache = SessionCache::new(client(true));
        assert!(cache.avatar().await.unwrap().is_none());
    }

    #[test]
    fn entry_freshness_follows_ttl() {
        let entry = UserCacheEntry {
            user: None,
            is_logged_in: false,
            fetched_at: Instant::now(),
        };
        assert!(entry.is_fresh(Duration::from_secs(60)));
        assert!(!entry.is_fresh(Duration::ZERO));
    }
}
