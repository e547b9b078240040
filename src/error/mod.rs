//! Error types for tdp-auth.

use thiserror::Error;

use crate::auth::error::{AuthError, InvalidTokenError, InvalidTokenSource};

/// Primary error type for crate-level operations (configuration loading, CLI).
#[derive(Error, Debug)]
pub enum TdpError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Authorization error: {0}")]
    Auth(AuthError),
}

impl TdpError {
    /// The rejected-token error carried by this error, if any.
    pub fn invalid_token(&self) -> Option<&InvalidTokenError> {
        match self {
            Self::Auth(err) => err.invalid_token(),
            _ => None,
        }
    }
}

impl From<InvalidTokenError> for TdpError {
    fn from(error: InvalidTokenError) -> Self {
        Self::Auth(AuthError::InvalidToken(error))
    }
}

impl InvalidTokenSource for TdpError {
    fn invalid_token(&self) -> Option<&InvalidTokenError> {
        TdpError::invalid_token(self)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TdpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_token_is_reachable_through_crate_error() {
        let err = TdpError::from(InvalidTokenError::single("svc"));
        assert_eq!(
            err.invalid_token().map(|e| e.ids().to_vec()),
            Some(vec!["svc".to_string()])
        );
        assert!(TdpError::Configuration("x".into()).invalid_token().is_none());
    }
}
