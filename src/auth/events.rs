//! Typed, synchronous token notifications.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A token was stored for `id`.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenStored {
    pub id: String,
    pub token: String,
}

impl std::fmt::Debug for TokenStored {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStored")
            .field("id", &self.id)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Tokens were invalidated (or cleared on logout).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokensRemoved {
    pub ids: Vec<String>,
}

/// Handle returned by [`Subject::subscribe`]; unique across all subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Observer list for one notification kind.
///
/// Handlers run synchronously on the notifying thread, in registration order.
/// The handler list is snapshotted before dispatch, so handlers may subscribe,
/// unsubscribe, or call back into the owner without deadlocking.
pub struct Subject<T> {
    handlers: Mutex<Vec<(SubscriptionId, Handler<T>)>>,
}

impl<T> Default for Subject<T> {
    fn default() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
        }
    }
}

impl<T> Subject<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        id
    }

    /// Returns `true` if the subscription belonged to this subject.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub fn notify(&self, event: &T) {
        let snapshot: Vec<Handler<T>> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in snapshot {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
