//! Login/logout notifications
//!
//! Independent parts of an application subscribe here to react when tokens
//! are stored or dropped, without sharing any other state.

use tokio::sync::broadcast;
use tracing::trace;

const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// New tokens were stored (login or refresh)
    TokensUpdated,
    /// Tokens were removed (logout or failed refresh)
    TokensCleared,
}

#[derive(Debug, Clone)]
pub struct AuthEvents {
    tx: broadcast::Sender<AuthEvent>,
}

impl AuthEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers; having none is not an error
    pub fn publish(&self, event: AuthEvent) {
        let receivers = self.tx.send(event).unwrap_or(0);
        trace!(?event, receivers, "Published auth event");
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_events_in_order() {
        let events = AuthEvents::new();
        let mut rx = events.subscribe();

        events.publish(AuthEvent::TokensUpdated);
        events.publish(AuthEvent::TokensCleared);

        assert_eq!(rx.recv().await.unwrap(), AuthEvent::TokensUpdated);
        assert_eq!(rx.recv().await.unwrap(), AuthEvent::TokensCleared);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        AuthEvents::new().publish(AuthEvent::TokensCleared);
    }
}
