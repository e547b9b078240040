use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use super::events::{Subject, SubscriptionId, TokenStored, TokensRemoved};

/// Options for [`TokenStore::get_token_async`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetTokenOptions {
    /// Wait for a token to be stored when none is cached. There is no timeout.
    pub wait: bool,
}

impl GetTokenOptions {
    pub fn wait() -> Self {
        Self { wait: true }
    }
}

/// In-memory cache of authorization id → token.
///
/// A present entry is the most recent successful authorization for that id.
/// Entries are only created for non-empty tokens. Stored and removed
/// notifications are delivered after the cache mutation, synchronously and
/// in subscription order.
///
/// # Example
/// ```
/// use tdp_auth::auth::TokenStore;
///
/// let store = TokenStore::new();
/// assert!(store.set_token("svc", "abc123"));
/// assert_eq!(store.get_token("svc").as_deref(), Some("abc123"));
/// store.invalidate_token(["svc"]);
/// assert!(store.get_token("svc").is_none());
/// ```
#[derive(Default)]
pub struct TokenStore {
    state: Mutex<StoreState>,
    stored: Subject<TokenStored>,
    removed: Subject<TokensRemoved>,
}

#[derive(Default)]
struct StoreState {
    tokens: BTreeMap<String, String>,
    waiters: HashMap<String, Vec<oneshot::Sender<String>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_token(&self, id: &str) -> Option<String> {
        self.state().tokens.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state().tokens.contains_key(id)
    }

    /// Resolve the cached token, or with `wait`, the next token stored for `id`.
    ///
    /// A waiting call stays pending until [`set_token`](Self::set_token) is
    /// called for exactly this id. It yields `None` only if the store is
    /// dropped first.
    pub async fn get_token_async(&self, id: &str, options: GetTokenOptions) -> Option<String> {
        let receiver = {
            let mut state = self.state();
            if let Some(token) = state.tokens.get(id) {
                return Some(token.clone());
            }
            if !options.wait {
                return None;
            }
            register_waiter(&mut state, id)
        };
        receiver.await.ok()
    }

    /// Register for the next token stored under `id`.
    ///
    /// Unless `force` is set, returns `None` when a token is already cached.
    /// The cache check and the registration happen atomically, so a token
    /// stored concurrently is never missed.
    pub(crate) fn next_token(&self, id: &str, force: bool) -> Option<oneshot::Receiver<String>> {
        let mut state = self.state();
        if !force && state.tokens.contains_key(id) {
            return None;
        }
        Some(register_waiter(&mut state, id))
    }

    /// Store `token` under `id`. Returns `false` (and changes nothing) for an empty token.
    pub fn set_token(&self, id: &str, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        let waiters = {
            let mut state = self.state();
            state.tokens.insert(id.to_string(), token.to_string());
            state.waiters.remove(id).unwrap_or_default()
        };
        tracing::debug!(id, waiters = waiters.len(), "authorization token stored");
        for waiter in waiters {
            let _ = waiter.send(token.to_string());
        }
        self.stored.notify(&TokenStored {
            id: id.to_string(),
            token: token.to_string(),
        });
        true
    }

    /// Remove the given ids and emit one removed notification carrying all of them,
    /// whether or not they were cached.
    pub fn invalidate_token<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        {
            let mut state = self.state();
            for id in &ids {
                state.tokens.remove(id);
            }
            prune_waiters(&mut state);
        }
        tracing::debug!(ids = ?ids, "authorization tokens invalidated");
        self.removed.notify(&TokensRemoved { ids });
    }

    /// Drop every cached token. Emits a removed notification only when something was cached.
    pub fn clear(&self) -> Vec<String> {
        let ids: Vec<String> = {
            let mut state = self.state();
            prune_waiters(&mut state);
            let tokens = std::mem::take(&mut state.tokens);
            tokens.into_keys().collect()
        };
        if !ids.is_empty() {
            self.removed.notify(&TokensRemoved { ids: ids.clone() });
        }
        ids
    }

    /// Snapshot of all cached tokens.
    pub fn tokens(&self) -> BTreeMap<String, String> {
        self.state().tokens.clone()
    }

    pub fn on_stored<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&TokenStored) + Send + Sync + 'static,
    {
        self.stored.subscribe(handler)
    }

    pub fn on_removed<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&TokensRemoved) + Send + Sync + 'static,
    {
        self.removed.subscribe(handler)
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.stored.unsubscribe(id) || self.removed.unsubscribe(id)
    }
}

fn register_waiter(state: &mut StoreState, id: &str) -> oneshot::Receiver<String> {
    let (tx, rx) = oneshot::channel();
    prune_waiters(state);
    state.waiters.entry(id.to_string()).or_default().push(tx);
    rx
}

/// Drop waiters whose receiver is gone, and ids left without any.
fn prune_waiters(state: &mut StoreState) {
    state.waiters.retain(|_, waiters| {
        waiters.retain(|waiter| !waiter.is_closed());
        !waiters.is_empty()
    });
}
