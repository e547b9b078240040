use thiserror::Error;

use crate::error::TdpError;

/// Errors raised while resolving, running, or storing authorizations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No authorization configuration with id {0} exists")]
    UnknownConfiguration(String),
    #[error("No authorization flow of type {0} found")]
    UnknownFlow(String),
    #[error("Invalid authorization configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Authorization flow for {id} returned an empty token")]
    EmptyToken { id: String },
    #[error("Authorization flow failed: {0}")]
    Flow(String),
    #[error("Authorization timed out after {0}ms")]
    Timeout(u64),
    #[error("Authorization was cancelled")]
    Cancelled,
    #[error(transparent)]
    InvalidToken(#[from] InvalidTokenError),
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<url::ParseError> for AuthError {
    fn from(error: url::ParseError) -> Self {
        Self::InvalidConfiguration(format!("invalid url: {error}"))
    }
}

/// Raised by collaborators when a downstream service rejects a previously issued token.
///
/// Callers catch it and pass [`InvalidTokenError::ids`] to
/// [`TokenManager::invalidate_token`](super::TokenManager::invalidate_token),
/// which makes the next authorization run prompt again.
///
/// # Example
/// ```
/// use tdp_auth::auth::InvalidTokenError;
///
/// let err = InvalidTokenError::new(["svc", "other"]);
/// assert_eq!(err.ids(), ["svc".to_string(), "other".to_string()]);
/// assert_eq!(err.to_string(), "Token is invalid for svc, other");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Token is invalid for {}", .ids.join(", "))]
pub struct InvalidTokenError {
    ids: Vec<String>,
}

impl InvalidTokenError {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn single(id: impl Into<String>) -> Self {
        Self { ids: vec![id.into()] }
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn into_ids(self) -> Vec<String> {
        self.ids
    }
}

/// Exposes an [`InvalidTokenError`] carried inside an arbitrary error type.
///
/// Implement this for the error type of operations passed to
/// [`TokenManager::with_authorizations`](super::TokenManager::with_authorizations)
/// so rejected tokens are invalidated and re-authorized.
pub trait InvalidTokenSource {
    fn invalid_token(&self) -> Option<&InvalidTokenError>;
}

impl InvalidTokenSource for InvalidTokenError {
    fn invalid_token(&self) -> Option<&InvalidTokenError> {
        Some(self)
    }
}

impl InvalidTokenSource for AuthError {
    fn invalid_token(&self) -> Option<&InvalidTokenError> {
        match self {
            Self::InvalidToken(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AuthError> for TdpError {
    fn from(error: AuthError) -> Self {
        TdpError::Auth(error)
    }
}
