//! Application session signals.

use tokio::sync::broadcast;

/// Session lifecycle signal published by the application's login layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { user: String },
    LoggedOut,
}

/// Process-wide session signal bus.
///
/// Owned by the application bootstrap and handed to whoever needs it;
/// [`TokenManager::attach_session`](super::TokenManager::attach_session)
/// clears all cached tokens on [`SessionEvent::LoggedOut`].
#[derive(Debug, Clone)]
pub struct SessionBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for SessionBus {
    fn default() -> Self {
        Self::new(16)
    }
}

impl SessionBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; returns how many listeners received it.
    pub fn publish(&self, event: SessionEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn logged_out(&self) -> usize {
        self.publish(SessionEvent::LoggedOut)
    }
}
