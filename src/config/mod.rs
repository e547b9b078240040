//! Configuration system (layered: env > config file > defaults).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::auth::{AuthorizationConfiguration, PopupSettings};
use crate::error::{Result, TdpError};

/// Names the configuration file to load.
pub const CONFIG_PATH_ENV: &str = "TDP_AUTH_CONFIG";
/// Overrides [`PopupSettings::timeout_secs`].
pub const POPUP_TIMEOUT_ENV: &str = "TDP_AUTH_POPUP_TIMEOUT_SECS";
/// Overrides [`PopupSettings::port`].
pub const POPUP_PORT_ENV: &str = "TDP_AUTH_POPUP_PORT";

/// Authorization configurations and popup flow settings.
///
/// # Example
/// ```
/// use tdp_auth::config::TdpConfig;
///
/// let config = TdpConfig::from_toml_str(r#"
///     [popup]
///     timeout_secs = 60
///
///     [[authorization]]
///     id = "svc"
///     type = "simplePopup"
///     url = "https://auth.example.org/login"
///     tokenParameter = "token"
/// "#)?;
/// assert_eq!(config.authorizations[0].id, "svc");
/// assert_eq!(config.popup.timeout_secs, 60);
/// # Ok::<(), tdp_auth::error::TdpError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TdpConfig {
    #[serde(rename = "authorization")]
    pub authorizations: Vec<AuthorizationConfiguration>,
    pub popup: PopupSettings,
}

impl TdpConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file. A missing file is an error.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            TdpError::Configuration(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Default configuration path (~/.tdp/authorizations.toml).
    pub fn default_path() -> PathBuf {
        directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().join(".tdp"))
            .unwrap_or_else(|| PathBuf::from(".tdp"))
            .join("authorizations.toml")
    }

    /// Load from `TDP_AUTH_CONFIG` (or the default path), then apply env overrides.
    ///
    /// A `.env` file is honored if present. A missing default file yields an
    /// empty configuration; a missing explicitly named file is an error.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::load_from_path(PathBuf::from(path))?,
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_from_path(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var(POPUP_TIMEOUT_ENV) {
            self.popup.timeout_secs = raw.trim().parse().map_err(|_| {
                TdpError::Configuration(format!("{POPUP_TIMEOUT_ENV} must be a number, got {raw}"))
            })?;
        }
        if let Ok(raw) = std::env::var(POPUP_PORT_ENV) {
            self.popup.port = raw.trim().parse().map_err(|_| {
                TdpError::Configuration(format!("{POPUP_PORT_ENV} must be a port, got {raw}"))
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for config in &self.authorizations {
            if config.id.trim().is_empty() {
                return Err(TdpError::Configuration(format!(
                    "authorization of type {} has an empty id",
                    config.kind
                )));
            }
        }
        Ok(())
    }
}
