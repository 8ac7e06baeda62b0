use clap::Parser;
use nodepulse::cli::{commands, Cli};
use std::process;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // -v wins over RUST_LOG's absence, RUST_LOG wins when set
    let default_filter = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(version = env!("CARGO_PKG_VERSION"), "nodepulse starting");

    let Some(command) = cli.command else {
        eprintln!("no command given; see --help");
        process::exit(1);
    };

    if let Err(e) = commands::handle_command(command).await {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
