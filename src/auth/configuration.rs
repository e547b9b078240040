//! Named authorization requirements.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::AuthError;

/// One named authorization requirement.
///
/// `kind` selects the [`AuthorizationFlow`](super::AuthorizationFlow) that
/// handles it; everything else the flow needs lives in `params`.
///
/// # Example
/// ```
/// use tdp_auth::auth::AuthorizationConfiguration;
///
/// let config = AuthorizationConfiguration::new("svc", "simplePopup")
///     .with_name("Some service")
///     .with_param("url", "https://x")
///     .with_param("tokenParameter", "tok");
/// assert_eq!(config.param_str("tokenParameter"), Some("tok"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationConfiguration {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl AuthorizationConfiguration {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            name: None,
            params: Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Like [`param_str`](Self::param_str) but fails when the parameter is absent or blank.
    pub fn require_param(&self, key: &str) -> Result<&str, AuthError> {
        match self.param_str(key) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(AuthError::InvalidConfiguration(format!(
                "authorization {} is missing required parameter {key}",
                self.id
            ))),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), AuthError> {
        if self.id.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "authorization configuration has an empty id".to_string(),
            ));
        }
        Ok(())
    }
}

/// What a caller asks to authorize: a registered id or an inline configuration.
#[derive(Debug, Clone)]
pub enum AuthorizationTarget {
    Id(String),
    Configuration(Arc<AuthorizationConfiguration>),
}

impl From<&str> for AuthorizationTarget {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl From<String> for AuthorizationTarget {
    fn from(id: String) -> Self {
        Self::Id(id)
    }
}

impl From<&String> for AuthorizationTarget {
    fn from(id: &String) -> Self {
        Self::Id(id.clone())
    }
}

impl From<AuthorizationConfiguration> for AuthorizationTarget {
    fn from(config: AuthorizationConfiguration) -> Self {
        Self::Configuration(Arc::new(config))
    }
}

impl From<Arc<AuthorizationConfiguration>> for AuthorizationTarget {
    fn from(config: Arc<AuthorizationConfiguration>) -> Self {
        Self::Configuration(config)
    }
}
