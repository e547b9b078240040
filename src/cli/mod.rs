//! CLI entry point for tdp-auth.

pub mod auth;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// TDP authorization CLI
#[derive(Parser, Debug)]
#[command(name = "tdp-auth", version, about = "Run and inspect TDP authorizations")]
pub struct Cli {
    /// Configuration file (defaults to $TDP_AUTH_CONFIG or ~/.tdp/authorizations.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List configured authorizations
    List,
    /// Run one or more authorizations
    Authorize(AuthorizeArgs),
}

/// Arguments for `tdp-auth authorize`.
#[derive(Parser, Debug)]
pub struct AuthorizeArgs {
    /// Authorization ids, run in order
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Re-run the flows even when tokens are cached
    #[arg(long)]
    pub force: bool,

    /// Override the popup timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Print the issued tokens to stdout
    #[arg(long)]
    pub print_token: bool,
}
