//! tdp-auth: authorization token manager for TDP applications
//!
//! Keeps a registry of named authorization configurations and pluggable
//! flows, caches the tokens they produce, and runs authorizations on demand
//! while reporting status to a caller-supplied render callback.
//!
//! # Quick Start
//!
//! ```no_run
//! use tdp_auth::prelude::*;
//!
//! # async fn example() -> tdp_auth::error::Result<()> {
//! let config = TdpConfig::from_env()?;
//! let manager = TokenManager::from_config(&config)?;
//!
//! let options = RunOptions::new(|render| {
//!     if matches!(render.status, AuthorizationStatus::NotTriggered) {
//!         render.trigger.spawn();
//!     }
//! });
//! manager.run_authorizations(["svc"], &options).await?;
//! println!("{:?}", manager.get_token("svc"));
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod prelude;

#[cfg(feature = "cli")]
pub mod cli;
