//! Single-flight token refresh
//!
//! At most one refresh-token exchange runs at a time. Requests that hit a 401
//! while it runs queue behind it and are settled together, in arrival order,
//! with its outcome. Every settled exchange bumps a generation counter so a
//! 401 for a request sent with an already-replaced token is replayed with the
//! current token instead of starting another exchange.

use crate::client::ApiClient;
use crate::error::ClientError;
use apimart_core::TokenSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

type Outcome = Result<TokenSet, ClientError>;

#[derive(Default)]
struct RefreshState {
    /// `Some` while an exchange is running
    waiters: Option<Vec<oneshot::Sender<Outcome>>>,
    generation: u64,
}

#[derive(Default)]
pub(crate) struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub(crate) fn is_refreshing(&self) -> bool {
        self.lock().waiters.is_some()
    }

    /// Tokens to replay a request with after it was rejected with 401.
    ///
    /// `sent_at` is the generation observed before the request was sent.
    pub(crate) async fn recover(&self, client: &ApiClient, sent_at: u64) -> Outcome {
        let pending = {
            let mut state = self.lock();
            if state.waiters.is_none() && state.generation != sent_at {
                None
            } else {
                Some(self.enqueue(&mut state, client))
            }
        };

        match pending {
            Some(rx) => wait(rx).await,
            None => {
                debug!("Token already refreshed since the request was sent");
                client.tokens().load().await?.ok_or_else(|| {
                    ClientError::SessionExpired("signed out while the request was in flight".into())
                })
            }
        }
    }

    /// Start an exchange, or join the one already running
    pub(crate) async fn refresh_now(&self, client: &ApiClient) -> Outcome {
        let rx = {
            let mut state = self.lock();
            self.enqueue(&mut state, client)
        };
        wait(rx).await
    }

    fn enqueue(&self, state: &mut RefreshState, client: &ApiClient) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        match state.waiters.as_mut() {
            Some(waiters) => waiters.push(tx),
            None => {
                state.waiters = Some(vec![tx]);
                let client = client.clone();
                tokio::spawn(async move {
                    let outcome = run_exchange(&client).await;
                    client.refresh_coordinator().settle(outcome);
                });
            }
        }
        rx
    }

    fn settle(&self, outcome: Outcome) {
        let waiters = {
            let mut state = self.lock();
            state.generation += 1;
            state.waiters.take().unwrap_or_default()
        };
        debug!(waiters = waiters.len(), "Settling queued requests");
        for waiter in waiters {
            // A waiter whose request was dropped is no longer listening
            let _ = waiter.send(outcome.clone());
        }
    }
}

async fn wait(rx: oneshot::Receiver<Outcome>) -> Outcome {
    rx.await
        .unwrap_or_else(|_| Err(ClientError::SessionExpired("token refresh was interrupted".into())))
}

async fn run_exchange(client: &ApiClient) -> Outcome {
    match client.exchange_refresh_token().await {
        Ok(tokens) => {
            info!("Access token refreshed");
            Ok(tokens)
        }
        Err(err) => {
            warn!(error = %err, "Token refresh failed, signing out");
            if let Err(e) = client.clear_session().await {
                warn!(error = %e, "Failed to clear tokens after refresh failure");
            }
            Err(match err {
                ClientError::SessionExpired(message) => ClientError::SessionExpired(message),
                other => ClientError::SessionExpired(format!("token refresh failed: {other}")),
            })
        }
    }
}
