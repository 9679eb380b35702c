//! Scry server — answers queries with web-search-grounded, streamed
//! model answers over WebSocket, with a non-streaming HTTP fallback.

use clap::Parser;
use scry_core::collaborators::Collaborators;
use scry_core::gateway::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Scry: web-search-grounded streaming answers
#[derive(Parser, Debug)]
#[command(name = "scry-server", version, about, long_about = None)]
struct Cli {
    /// Configuration file path (default: ./scry.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));
    tracing_subscriber::registry().with(stderr_layer).init();

    // Load configuration
    let mut config = scry_core::config::load_config(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    // Best-effort collaborator setup: a missing API key disables that
    // capability, it never prevents startup.
    let collaborators = Arc::new(Collaborators::from_config(&config));
    info!(
        retriever = collaborators.has_retriever(),
        generator = collaborators.has_generator(),
        "collaborators initialized"
    );

    let state = AppState::new(config, collaborators);
    scry_core::gateway::run(state).await?;
    Ok(())
}
