//
// main.rs
// Report-Tools-rs
//
// Tokio entry point: installs the tracing subscriber and hands off to the CLI.
//
// Report-Tools-rs maintainers - October 2026

use report_tools::cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    cli::run().await
}
