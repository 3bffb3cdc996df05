use anyhow::Context;
use clap::Parser;
use rust_scholar_mcp::{Config, Server};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "rust-scholar-mcp",
    version,
    about = "MCP server gateway for academic database search (Google Scholar + JSTOR)"
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rust_scholar_mcp={default_level}")));

    // stdout carries the MCP transport, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_ref()).context("failed to load configuration")?;
    info!(
        scholar = %config.scholar.base_url,
        jstor = %config.jstor.base_url,
        "Configuration loaded"
    );

    let server = Server::new(config);
    server.run().await.context("server terminated with error")?;

    Ok(())
}
