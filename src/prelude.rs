//! Convenience re-exports for common use.

pub use crate::auth::{
    AuthError, AuthorizationConfiguration, AuthorizationFlow, AuthorizationStatus,
    GetTokenOptions, InvalidTokenError, RenderAuthorization, RunOptions, SessionBus,
    SessionEvent, TokenManager,
};
pub use crate::config::TdpConfig;
pub use crate::error::{Result, TdpError};
