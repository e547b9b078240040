//! tdp-auth CLI binary entry point.

use clap::Parser;
use tdp_auth::cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::List => tdp_auth::cli::auth::handle_list(config).await,
        Commands::Authorize(args) => tdp_auth::cli::auth::handle_authorize(config, &args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
