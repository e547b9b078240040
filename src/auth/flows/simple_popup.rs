use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use bon::Builder;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use url::Url;

use crate::auth::configuration::AuthorizationConfiguration;
use crate::auth::error::AuthError;
use crate::auth::flow::AuthorizationFlow;

const CALLBACK_PATH: &str = "/callback";
/// How long the listener may take to close its connections once the flow is over.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Settings for the loopback listener used by [`SimplePopupFlow`].
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct PopupSettings {
    #[builder(default = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub bind_address: IpAddr,
    /// `0` picks a free port.
    #[builder(default)]
    pub port: u16,
    #[builder(default = 300)]
    pub timeout_secs: u64,
    /// Query parameter carrying the callback address to the authorization page.
    #[builder(default = "redirect_uri".to_string())]
    pub redirect_parameter: String,
}

impl Default for PopupSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl PopupSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Opens the authorization page for the user.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn open(&self, url: &Url) -> Result<(), AuthError>;
}

/// Launches the system browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

#[async_trait]
impl BrowserLauncher for SystemBrowser {
    async fn open(&self, url: &Url) -> Result<(), AuthError> {
        let target = url.to_string();
        tokio::task::spawn_blocking(move || open::that(target))
            .await
            .map_err(|err| AuthError::Flow(format!("browser launcher panicked: {err}")))??;
        Ok(())
    }
}

/// The bundled `simplePopup` flow.
///
/// Opens the configured `url` with a callback address appended and waits
/// for the authorization page to redirect back with the token in the
/// `tokenParameter` query parameter. Giving up after the configured timeout
/// plays the role of the user closing the popup.
///
/// Required configuration parameters: `url`, `tokenParameter`.
#[derive(Clone)]
pub struct SimplePopupFlow {
    launcher: Arc<dyn BrowserLauncher>,
    settings: PopupSettings,
}

impl Default for SimplePopupFlow {
    fn default() -> Self {
        Self::new(PopupSettings::default())
    }
}

impl SimplePopupFlow {
    pub fn new(settings: PopupSettings) -> Self {
        Self {
            launcher: Arc::new(SystemBrowser),
            settings,
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn settings(&self) -> &PopupSettings {
        &self.settings
    }
}

#[async_trait]
impl AuthorizationFlow for SimplePopupFlow {
    async fn authorize(&self, config: &AuthorizationConfiguration) -> Result<String, AuthError> {
        let mut url = Url::parse(config.require_param("url")?)?;
        let token_parameter = config.require_param("tokenParameter")?;

        let listener =
            TcpListener::bind(SocketAddr::new(self.settings.bind_address, self.settings.port))
                .await?;
        let callback_url = format!("http://{}{CALLBACK_PATH}", listener.local_addr()?);
        url.query_pairs_mut()
            .append_pair(&self.settings.redirect_parameter, &callback_url);

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let router = Router::new()
            .route(CALLBACK_PATH, get(callback))
            .with_state(CallbackState {
                token_parameter: Arc::from(token_parameter),
                outcome: Arc::new(Mutex::new(Some(outcome_tx))),
            });
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        tracing::debug!(id = %config.id, callback = %callback_url, "opening authorization popup");
        let outcome = match self.launcher.open(&url).await {
            Ok(()) => self.await_callback(config, outcome_rx).await,
            Err(err) => Err(err),
        };

        let _ = shutdown_tx.send(());
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
            Ok(Ok(Err(err))) => tracing::debug!(error = %err, "callback listener failed"),
            Ok(_) => {}
            Err(_) => server.abort(),
        }
        outcome
    }
}

impl SimplePopupFlow {
    async fn await_callback(
        &self,
        config: &AuthorizationConfiguration,
        outcome: oneshot::Receiver<Result<String, String>>,
    ) -> Result<String, AuthError> {
        let timeout = self.settings.timeout();
        match tokio::time::timeout(timeout, outcome).await {
            Ok(Ok(result)) => result.map_err(AuthError::Flow),
            Ok(Err(_)) => Err(AuthError::Flow("callback listener stopped".to_string())),
            Err(_) => {
                tracing::warn!(id = %config.id, "authorization popup timed out");
                Err(AuthError::Timeout(timeout.as_millis() as u64))
            }
        }
    }
}

#[derive(Clone)]
struct CallbackState {
    token_parameter: Arc<str>,
    /// Taken by the first callback; later ones are answered but not reported.
    outcome: Arc<Mutex<Option<oneshot::Sender<Result<String, String>>>>>,
}

async fn callback(
    State(state): State<CallbackState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, &'static str) {
    let outcome = callback_outcome(&params, &state.token_parameter);
    let response = match &outcome {
        Ok(_) => (StatusCode::OK, "Authorization complete. You can close this window."),
        Err(_) => (
            StatusCode::BAD_REQUEST,
            "Authorization failed. You can close this window.",
        ),
    };
    let sender = state.outcome.lock().ok().and_then(|mut slot| slot.take());
    if let Some(sender) = sender {
        let _ = sender.send(outcome);
    }
    response
}

fn callback_outcome(
    params: &HashMap<String, String>,
    token_parameter: &str,
) -> Result<String, String> {
    if let Some(error) = params.get("error") {
        return Err(format!("authorization page reported: {error}"));
    }
    match params.get(token_parameter) {
        Some(token) if !token.is_empty() => Ok(token.clone()),
        _ => Err(format!("callback did not carry {token_parameter}")),
    }
}
