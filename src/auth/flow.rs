//! Pluggable authorization flows.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::configuration::AuthorizationConfiguration;
use super::error::AuthError;

/// Type key of the flow bundled with every [`TokenManager`](super::TokenManager).
pub const SIMPLE_POPUP: &str = "simplePopup";

/// Strategy that performs the interaction required to obtain a token.
///
/// Flows are registered under a type key with
/// [`TokenManager::add_authorization_flow`](super::TokenManager::add_authorization_flow)
/// and selected by [`AuthorizationConfiguration::kind`].
#[async_trait]
pub trait AuthorizationFlow: Send + Sync {
    /// Run the flow for `config`, resolving with the issued token.
    async fn authorize(&self, config: &AuthorizationConfiguration) -> Result<String, AuthError>;
}

/// Boxed async closure signature accepted by [`FnFlow`].
pub type FlowFn = Arc<
    dyn Fn(Arc<AuthorizationConfiguration>) -> BoxFuture<'static, Result<String, AuthError>>
        + Send
        + Sync,
>;

/// Adapts an async closure into an [`AuthorizationFlow`].
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use futures::FutureExt;
/// use tdp_auth::auth::{AuthError, AuthorizationFlow, FnFlow};
///
/// let flow: Arc<dyn AuthorizationFlow> = Arc::new(FnFlow::new(|config| {
///     async move { Ok::<_, AuthError>(format!("token-for-{}", config.id)) }.boxed()
/// }));
/// ```
#[derive(Clone)]
pub struct FnFlow {
    func: FlowFn,
}

impl FnFlow {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(Arc<AuthorizationConfiguration>) -> BoxFuture<'static, Result<String, AuthError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for FnFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFlow").finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthorizationFlow for FnFlow {
    async fn authorize(&self, config: &AuthorizationConfiguration) -> Result<String, AuthError> {
        (self.func)(Arc::new(config.clone())).await
    }
}
