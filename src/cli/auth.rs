//! CLI handlers for listing and running authorizations.

use std::path::Path;

use tokio::sync::mpsc;

use super::AuthorizeArgs;
use crate::auth::{AuthError, AuthorizationStatus, RenderAuthorization, RunOptions, TokenManager};
use crate::config::TdpConfig;
use crate::error::Result;

fn load_config(path: Option<&Path>) -> Result<TdpConfig> {
    match path {
        Some(path) => TdpConfig::load_from_path(path),
        None => TdpConfig::from_env(),
    }
}

/// Handle `tdp-auth list`.
pub async fn handle_list(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let manager = TokenManager::from_config(&config)?;
    let configurations = manager.configurations();

    if configurations.is_empty() {
        println!("No authorizations configured.");
        return Ok(());
    }

    println!("🔐 Configured authorizations\n");
    for config in configurations {
        match &config.name {
            Some(name) => println!("  {} ({}): {name}", config.id, config.kind),
            None => println!("  {} ({})", config.id, config.kind),
        }
    }
    Ok(())
}

/// Handle `tdp-auth authorize <ids>...`.
///
/// The command line invocation stands in for the user action, so every
/// `NotTriggered` status triggers the flow right away. The first flow
/// failure ends the command.
pub async fn handle_authorize(
    config_path: Option<&Path>,
    args: &AuthorizeArgs,
) -> Result<()> {
    let ids = &args.ids;
    let mut config = load_config(config_path)?;
    if let Some(timeout) = args.timeout {
        config.popup.timeout_secs = timeout;
    }
    let manager = TokenManager::from_config(&config)?;

    let (failed_tx, mut failed_rx) = mpsc::unbounded_channel();
    let options = RunOptions::new(move |render| {
        if let Some(failure) = print_status(&render) {
            let _ = failed_tx.send(failure);
        }
    })
    .force(args.force);

    tokio::select! {
        result = manager.run_authorizations(ids.iter(), &options) => result?,
        Some(failure) = failed_rx.recv() => return Err(failure.into()),
    }

    if args.print_token {
        for id in ids {
            if let Some(token) = manager.get_token(id) {
                println!("{id}\t{token}");
            }
        }
    }
    Ok(())
}

fn print_status(render: &RenderAuthorization) -> Option<AuthError> {
    let name = render.configuration.display_name();
    match &render.status {
        AuthorizationStatus::NotTriggered => {
            eprintln!("🔗 Authorization required for {name}, opening browser...");
            render.trigger.spawn();
        }
        AuthorizationStatus::Pending => eprintln!("⏳ Waiting for {name}..."),
        AuthorizationStatus::Success => eprintln!("✅ {name} authorized"),
        AuthorizationStatus::Error(err) => {
            eprintln!("❌ {name}: {err}");
            return Some(AuthError::Flow(format!("{name}: {err}")));
        }
    }
    None
}
