//! Chatrelay daemon - streaming HTTP relay to an OpenAI-compatible API

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use chatrelay_server::config::Config;
use chatrelay_server::error::Result;
use chatrelay_server::relay::{AppState, RelayServer};
use chatrelay_server::upstream::OpenAiCompatibleClient;

/// Chatrelay - relays chat conversations to an LLM and streams the reply back
#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(about = "Streaming relay between chat clients and an OpenAI-compatible API")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the relay server (default command)
    #[command(name = "serve")]
    Serve {
        /// Override the configured listen address
        #[arg(long)]
        listen: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None => serve(cli.config, None).await,
        Some(Command::Serve { listen }) => serve(cli.config, listen).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chatrelay_server=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(config_path: Option<PathBuf>, listen: Option<String>) -> Result<()> {
    tracing::info!("Starting chatrelay daemon");

    let mut config = Config::load(config_path.as_deref())?;
    if let Some(listen) = listen {
        config.server.listen_addr = listen;
    }
    tracing::debug!("Config loaded: {:?}", config);

    let system_prompt = config.prompt.resolve()?;
    tracing::info!("System prompt loaded ({} chars)", system_prompt.chars().count());

    let upstream = OpenAiCompatibleClient::new(&config.upstream)?;

    let state = AppState::new(system_prompt, Arc::new(upstream));
    let server = RelayServer::new(config.server.clone(), state);

    server.serve().await?;

    tracing::info!("Chatrelay daemon stopped");
    Ok(())
}
