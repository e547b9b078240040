//! Token manager: configuration and flow registry, token cache, and the
//! authorization runner.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::configuration::{AuthorizationConfiguration, AuthorizationTarget};
use super::error::{AuthError, InvalidTokenError, InvalidTokenSource};
use super::events::{SubscriptionId, TokenStored, TokensRemoved};
use super::flow::{AuthorizationFlow, SIMPLE_POPUP};
use super::flows::SimplePopupFlow;
use super::session::{SessionBus, SessionEvent};
use super::status::{transition, AuthorizationStatus, StatusEvent};
use super::store::{GetTokenOptions, TokenStore};
use crate::config::TdpConfig;

/// Render callback invoked on every status transition of an authorization run.
pub type RenderFn = Arc<dyn Fn(RenderAuthorization) + Send + Sync>;

type InFlight = Shared<BoxFuture<'static, Result<String, Arc<AuthError>>>>;

/// Options for [`TokenManager::run_authorizations`].
#[derive(Clone)]
pub struct RunOptions {
    pub render: RenderFn,
    /// Run the flow even if a token is already cached, replacing it.
    pub force: bool,
    /// Rejection that made this run necessary, shown alongside the prompt.
    pub rejected: Option<InvalidTokenError>,
}

impl RunOptions {
    pub fn new<F>(render: F) -> Self
    where
        F: Fn(RenderAuthorization) + Send + Sync + 'static,
    {
        Self {
            render: Arc::new(render),
            force: false,
            rejected: None,
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn rejected(mut self, rejected: InvalidTokenError) -> Self {
        self.rejected = Some(rejected);
        self
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("force", &self.force)
            .field("rejected", &self.rejected)
            .finish_non_exhaustive()
    }
}

/// Snapshot handed to the render callback.
#[derive(Clone)]
pub struct RenderAuthorization {
    pub configuration: Arc<AuthorizationConfiguration>,
    pub status: AuthorizationStatus,
    /// Set when a previously issued token was rejected downstream and this
    /// run re-prompts for it.
    pub rejected: Option<InvalidTokenError>,
    /// Starts (or retries) the flow; wire it to a user action.
    pub trigger: Trigger,
}

impl RenderAuthorization {
    pub fn error(&self) -> Option<&Arc<AuthError>> {
        self.status.error()
    }
}

impl fmt::Debug for RenderAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderAuthorization")
            .field("id", &self.configuration.id)
            .field("status", &self.status)
            .field("rejected", &self.rejected)
            .finish_non_exhaustive()
    }
}

struct RunState {
    configuration: Arc<AuthorizationConfiguration>,
    status: Mutex<AuthorizationStatus>,
    render: RenderFn,
    rejected: Option<InvalidTokenError>,
}

/// Starts the authorization flow of one run.
///
/// Invoking it while the run is pending joins the flow already in flight
/// for the same configuration id instead of starting another. Failures are
/// reported to the render callback as [`AuthorizationStatus::Error`] and
/// never returned; the trigger can be invoked again afterwards. Once the run
/// has succeeded, invoking it does nothing: the run has already delivered
/// its token. Re-authorize with a new run using [`RunOptions::force()`].
#[derive(Clone)]
pub struct Trigger {
    inner: Arc<ManagerInner>,
    run: Arc<RunState>,
}

impl Trigger {
    pub fn configuration(&self) -> &Arc<AuthorizationConfiguration> {
        &self.run.configuration
    }

    pub fn status(&self) -> AuthorizationStatus {
        lock(&self.run.status).clone()
    }

    pub async fn run(&self) {
        if !self.advance(StatusEvent::Triggered) {
            return;
        }
        let config = self.run.configuration.clone();
        if let Err(err) = self.inner.authorize(config).await {
            tracing::warn!(
                id = %self.run.configuration.id,
                error = %err,
                "authorization flow failed"
            );
            self.advance(StatusEvent::Failed(err));
        }
    }

    /// Run the trigger on a background task.
    pub fn spawn(&self) -> JoinHandle<()> {
        let trigger = self.clone();
        tokio::spawn(async move { trigger.run().await })
    }

    fn advance(&self, event: StatusEvent) -> bool {
        let next = {
            let mut status = lock(&self.run.status);
            match transition(&status, event) {
                Some(next) => {
                    *status = next.clone();
                    next
                }
                None => return false,
            }
        };
        self.render(next);
        true
    }

    fn render(&self, status: AuthorizationStatus) {
        (self.run.render)(RenderAuthorization {
            configuration: self.run.configuration.clone(),
            status,
            rejected: self.run.rejected.clone(),
            trigger: self.clone(),
        });
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("id", &self.run.configuration.id)
            .finish_non_exhaustive()
    }
}

struct ManagerInner {
    configurations: RwLock<HashMap<String, Arc<AuthorizationConfiguration>>>,
    flows: RwLock<HashMap<String, Arc<dyn AuthorizationFlow>>>,
    store: TokenStore,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

impl ManagerInner {
    fn flow_for(&self, kind: &str) -> Result<Arc<dyn AuthorizationFlow>, AuthError> {
        self.flows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .cloned()
            .ok_or_else(|| AuthError::UnknownFlow(kind.to_string()))
    }

    /// Run the flow for `config`, or join the one already in flight for its id.
    async fn authorize(
        self: &Arc<Self>,
        config: Arc<AuthorizationConfiguration>,
    ) -> Result<String, Arc<AuthError>> {
        let flow = self.flow_for(&config.kind).map_err(Arc::new)?;
        let attempt = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(&config.id) {
                Some(existing) => {
                    tracing::debug!(id = %config.id, "joining in-flight authorization");
                    existing.clone()
                }
                None => {
                    // Spawned while the map is locked so the task cannot remove
                    // its entry before it is inserted.
                    let task = tokio::spawn(run_flow(Arc::downgrade(self), flow, config.clone()));
                    let attempt = async move {
                        task.await.unwrap_or_else(|err| {
                            Err(Arc::new(AuthError::Flow(format!(
                                "authorization flow task failed: {err}"
                            ))))
                        })
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(config.id.clone(), attempt.clone());
                    attempt
                }
            }
        };
        attempt.await
    }
}

/// Executes a flow and stores its token. Runs on its own task, so it
/// completes even if every joined trigger is dropped.
async fn run_flow(
    inner: Weak<ManagerInner>,
    flow: Arc<dyn AuthorizationFlow>,
    config: Arc<AuthorizationConfiguration>,
) -> Result<String, Arc<AuthError>> {
    tracing::debug!(id = %config.id, kind = %config.kind, "starting authorization flow");
    let result = flow.authorize(&config).await;

    let inner = inner.upgrade().ok_or_else(|| Arc::new(AuthError::Cancelled))?;
    lock(&inner.in_flight).remove(&config.id);

    let token = result.map_err(Arc::new)?;
    if !inner.store.set_token(&config.id, &token) {
        return Err(Arc::new(AuthError::EmptyToken {
            id: config.id.clone(),
        }));
    }
    Ok(token)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns authorization configurations, flows, and issued tokens.
///
/// Cheap to clone; clones share state. Construct one at application start
/// and hand it to whatever needs tokens.
///
/// # Example
/// ```no_run
/// use tdp_auth::auth::{AuthorizationConfiguration, AuthorizationStatus, RunOptions, TokenManager};
///
/// # async fn example() -> Result<(), tdp_auth::auth::AuthError> {
/// let manager = TokenManager::new();
/// manager.add_authorization_configuration([AuthorizationConfiguration::new("svc", "simplePopup")
///     .with_param("url", "https://auth.example.org/login")
///     .with_param("tokenParameter", "token")])?;
///
/// let options = RunOptions::new(|render| {
///     if matches!(render.status, AuthorizationStatus::NotTriggered) {
///         render.trigger.spawn();
///     }
/// });
/// manager.run_authorizations(["svc"], &options).await?;
/// assert!(manager.get_token("svc").is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<ManagerInner>,
}

impl Default for TokenManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut configurations: Vec<String> = self
            .inner
            .configurations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        configurations.sort();
        f.debug_struct("TokenManager")
            .field("configurations", &configurations)
            .field("flows", &self.flow_types())
            .field("tokens", &self.inner.store.tokens().len())
            .finish()
    }
}

impl TokenManager {
    /// Manager with the bundled `simplePopup` flow registered.
    pub fn new() -> Self {
        let manager = Self::empty();
        manager.add_authorization_flow([(
            SIMPLE_POPUP,
            Arc::new(SimplePopupFlow::default()) as Arc<dyn AuthorizationFlow>,
        )]);
        manager
    }

    /// Manager without any flows.
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                configurations: RwLock::new(HashMap::new()),
                flows: RwLock::new(HashMap::new()),
                store: TokenStore::new(),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Manager with the popup flow built from `config.popup` and all
    /// configured authorizations registered.
    pub fn from_config(config: &TdpConfig) -> Result<Self, AuthError> {
        let manager = Self::empty();
        manager.add_authorization_flow([(
            SIMPLE_POPUP,
            Arc::new(SimplePopupFlow::new(config.popup.clone())) as Arc<dyn AuthorizationFlow>,
        )]);
        manager.add_authorization_configuration(config.authorizations.iter().cloned())?;
        Ok(manager)
    }

    /// Register configurations by id, replacing existing entries with the same id.
    ///
    /// The batch is rejected as a whole if any configuration has an empty id.
    pub fn add_authorization_configuration<I>(&self, configurations: I) -> Result<(), AuthError>
    where
        I: IntoIterator<Item = AuthorizationConfiguration>,
    {
        let configurations: Vec<AuthorizationConfiguration> = configurations.into_iter().collect();
        for config in &configurations {
            config.validate()?;
        }
        let mut registry = self
            .inner
            .configurations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for config in configurations {
            tracing::debug!(id = %config.id, kind = %config.kind, "authorization configuration registered");
            registry.insert(config.id.clone(), Arc::new(config));
        }
        Ok(())
    }

    /// Register flows by type key, replacing existing flows with the same key.
    pub fn add_authorization_flow<I, K>(&self, flows: I)
    where
        I: IntoIterator<Item = (K, Arc<dyn AuthorizationFlow>)>,
        K: Into<String>,
    {
        let mut registry = self
            .inner
            .flows
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for (kind, flow) in flows {
            registry.insert(kind.into(), flow);
        }
    }

    pub fn configuration(&self, id: &str) -> Option<Arc<AuthorizationConfiguration>> {
        self.inner
            .configurations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// All registered configurations, ordered by id.
    pub fn configurations(&self) -> Vec<Arc<AuthorizationConfiguration>> {
        let mut configurations: Vec<_> = self
            .inner
            .configurations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        configurations.sort_by(|a, b| a.id.cmp(&b.id));
        configurations
    }

    pub fn flow_types(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self
            .inner
            .flows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        kinds.sort();
        kinds
    }

    pub fn store(&self) -> &TokenStore {
        &self.inner.store
    }

    pub fn get_token(&self, id: &str) -> Option<String> {
        self.inner.store.get_token(id)
    }

    pub async fn get_token_async(&self, id: &str, options: GetTokenOptions) -> Option<String> {
        self.inner.store.get_token_async(id, options).await
    }

    pub fn set_token(&self, id: &str, token: &str) -> bool {
        self.inner.store.set_token(id, token)
    }

    pub fn invalidate_token<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.store.invalidate_token(ids)
    }

    /// All cached tokens, keyed by authorization id.
    pub fn tokens(&self) -> std::collections::BTreeMap<String, String> {
        self.inner.store.tokens()
    }

    pub fn on_token_stored<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&TokenStored) + Send + Sync + 'static,
    {
        self.inner.store.on_stored(handler)
    }

    pub fn on_tokens_removed<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&TokensRemoved) + Send + Sync + 'static,
    {
        self.inner.store.on_removed(handler)
    }

    pub fn off(&self, subscription: SubscriptionId) -> bool {
        self.inner.store.off(subscription)
    }

    /// Clear every cached token, as on user logout. Returns the cleared ids.
    pub fn user_logged_out(&self) -> Vec<String> {
        let ids = self.inner.store.clear();
        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "cleared authorization tokens after logout");
        }
        ids
    }

    /// Clear tokens whenever `bus` reports a logout.
    ///
    /// The listener stops when the bus closes or the manager is dropped.
    pub fn attach_session(&self, bus: &SessionBus) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                let clear = match rx.recv().await {
                    Ok(SessionEvent::LoggedOut) => true,
                    Ok(SessionEvent::LoggedIn { .. }) => false,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "session listener lagged; clearing tokens");
                        true
                    }
                    Err(RecvError::Closed) => break,
                };
                if clear {
                    let Some(inner) = inner.upgrade() else {
                        break;
                    };
                    TokenManager { inner }.user_logged_out();
                }
            }
        })
    }

    fn resolve(&self, target: AuthorizationTarget) -> Result<Arc<AuthorizationConfiguration>, AuthError> {
        match target {
            AuthorizationTarget::Id(id) => self
                .configuration(&id)
                .ok_or(AuthError::UnknownConfiguration(id)),
            AuthorizationTarget::Configuration(config) => {
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Run each target in order, awaiting one before starting the next.
    pub async fn run_authorizations<I, T>(&self, targets: I, options: &RunOptions) -> Result<(), AuthError>
    where
        I: IntoIterator<Item = T>,
        T: Into<AuthorizationTarget>,
    {
        for target in targets {
            self.run_authorization(target, options).await?;
        }
        Ok(())
    }

    /// Ensure a token exists for one configuration.
    ///
    /// Returns `Ok(None)` without rendering when a token is cached and
    /// `force` is unset. Otherwise renders
    /// [`NotTriggered`](AuthorizationStatus::NotTriggered) and waits, without
    /// a timeout, until a token is stored for the id by any trigger, then
    /// renders [`Success`](AuthorizationStatus::Success) and returns it.
    /// Flow failures are rendered, never returned.
    pub async fn run_authorization(
        &self,
        target: impl Into<AuthorizationTarget>,
        options: &RunOptions,
    ) -> Result<Option<String>, AuthError> {
        let config = self.resolve(target.into())?;
        let Some(next_token) = self.inner.store.next_token(&config.id, options.force) else {
            tracing::debug!(id = %config.id, "authorization already present");
            return Ok(None);
        };

        let trigger = Trigger {
            inner: self.inner.clone(),
            run: Arc::new(RunState {
                configuration: config.clone(),
                status: Mutex::new(AuthorizationStatus::NotTriggered),
                render: options.render.clone(),
                rejected: options.rejected.clone(),
            }),
        };
        trigger.render(AuthorizationStatus::NotTriggered);

        let token = next_token.await.map_err(|_| AuthError::Cancelled)?;
        trigger.advance(StatusEvent::Authorized);
        Ok(Some(token))
    }

    /// Authorize `targets`, then run `operation`, re-authorizing and retrying
    /// whenever the operation reports a rejected token.
    ///
    /// The ids carried by the rejection are invalidated before the next
    /// attempt, and the renders of that attempt carry the rejection in
    /// [`RenderAuthorization::rejected`]. Any other error is returned as is.
    pub async fn with_authorizations<I, T, F, Fut, R, E>(
        &self,
        targets: I,
        options: &RunOptions,
        mut operation: F,
    ) -> Result<R, E>
    where
        I: IntoIterator<Item = T>,
        T: Into<AuthorizationTarget>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: InvalidTokenSource + From<AuthError>,
    {
        let targets: Vec<AuthorizationTarget> = targets.into_iter().map(Into::into).collect();
        let mut options = options.clone();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.run_authorizations(targets.iter().cloned(), &options)
                .await
                .map_err(E::from)?;
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let rejected = match err.invalid_token() {
                Some(rejected) => rejected.clone(),
                None => return Err(err),
            };
            tracing::warn!(attempt, ids = ?rejected.ids(), "token rejected; re-authorizing");
            self.invalidate_token(rejected.ids().to_vec());
            options = options.rejected(rejected);
        }
    }
}
