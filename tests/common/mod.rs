//! Shared test helpers: scripted flows and a recording render callback.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Notify};

use tdp_auth::auth::{
    AuthError, AuthorizationConfiguration, AuthorizationFlow, AuthorizationStatus,
    InvalidTokenError, RenderAuthorization, RunOptions, Trigger,
};

/// Status label without the error payload, for compact assertions.
pub fn label(status: &AuthorizationStatus) -> &'static str {
    match status {
        AuthorizationStatus::NotTriggered => "not_triggered",
        AuthorizationStatus::Pending => "pending",
        AuthorizationStatus::Success => "success",
        AuthorizationStatus::Error(_) => "error",
    }
}

/// Records every render call and optionally triggers on `NotTriggered`.
#[derive(Clone, Default)]
pub struct Recorder {
    renders: Arc<Mutex<Vec<RenderAuthorization>>>,
    changed: Arc<Notify>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render callback that only records.
    pub fn passive(&self) -> RunOptions {
        let recorder = self.clone();
        RunOptions::new(move |render| recorder.record(&render))
    }

    /// Render callback that records and spawns the trigger on `NotTriggered`.
    pub fn auto_trigger(&self) -> RunOptions {
        let recorder = self.clone();
        RunOptions::new(move |render| {
            recorder.record(&render);
            if matches!(render.status, AuthorizationStatus::NotTriggered) {
                render.trigger.spawn();
            }
        })
    }

    fn record(&self, render: &RenderAuthorization) {
        self.renders.lock().unwrap().push(render.clone());
        self.changed.notify_waiters();
    }

    pub fn renders(&self) -> Vec<(String, AuthorizationStatus)> {
        self.renders
            .lock()
            .unwrap()
            .iter()
            .map(|render| (render.configuration.id.clone(), render.status.clone()))
            .collect()
    }

    /// Rejection carried by the render call at `index`.
    pub fn rejected(&self, index: usize) -> Option<InvalidTokenError> {
        self.renders.lock().unwrap()[index].rejected.clone()
    }

    /// `(id, label)` pairs in render order.
    pub fn labels(&self) -> Vec<(String, &'static str)> {
        self.renders()
            .iter()
            .map(|(id, status)| (id.clone(), label(status)))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.renders.lock().unwrap().len()
    }

    /// Trigger handed out by the render call at `index`.
    pub fn trigger(&self, index: usize) -> Trigger {
        self.renders.lock().unwrap()[index].trigger.clone()
    }

    /// Wait until at least `count` renders were recorded.
    pub async fn wait_for(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.changed.notified();
                if self.count() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {count} renders, got {:?}", self.labels()));
    }
}

/// Flow returning a fixed result and counting its invocations.
pub struct ScriptedFlow {
    result: Result<String, String>,
    calls: AtomicUsize,
}

impl ScriptedFlow {
    pub fn token(token: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(token.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Err(reason.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthorizationFlow for ScriptedFlow {
    async fn authorize(&self, _config: &AuthorizationConfiguration) -> Result<String, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map_err(AuthError::Flow)
    }
}

/// Flow that blocks until [`GatedFlow::release`] supplies its result.
pub struct GatedFlow {
    gate: watch::Sender<Option<Result<String, String>>>,
    calls: AtomicUsize,
    started: Notify,
}

impl GatedFlow {
    pub fn new() -> Arc<Self> {
        let (gate, _) = watch::channel(None);
        Arc::new(Self {
            gate,
            calls: AtomicUsize::new(0),
            started: Notify::new(),
        })
    }

    pub fn release(&self, result: Result<&str, &str>) {
        self.gate
            .send_replace(Some(result.map(String::from).map_err(String::from)));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Wait until the flow has been invoked at least once.
    pub async fn wait_started(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.started.notified();
                if self.calls() > 0 {
                    return;
                }
                notified.await;
            }
        })
        .await
        .expect("flow was never started");
    }
}

#[async_trait]
impl AuthorizationFlow for GatedFlow {
    async fn authorize(&self, _config: &AuthorizationConfiguration) -> Result<String, AuthError> {
        let mut rx = self.gate.subscribe();
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_waiters();
        let outcome = rx.wait_for(Option::is_some).await.map(|value| value.clone());
        outcome
            .map_err(|_| AuthError::Cancelled)?
            .unwrap_or_else(|| Err("gate closed".to_string()))
            .map_err(AuthError::Flow)
    }
}

/// Configuration of a custom type with no parameters.
pub fn config(id: &str, kind: &str) -> AuthorizationConfiguration {
    AuthorizationConfiguration::new(id, kind)
}
