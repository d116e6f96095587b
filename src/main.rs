mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sentiment_space::config::AppConfig;

#[derive(Parser)]
#[command(
    name = "sentiment-space",
    version,
    about = "Thought journal with local summarization and sentiment analysis"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API server
    Serve,
    /// Manage the local inference model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Analyze one thought and store it
    Analyze {
        /// The thought text
        text: String,
    },
    /// Show journal statistics
    Stats,
    /// Export all thoughts as JSON to stdout
    Export,
    /// Run database and model diagnostics
    Doctor,
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the configured ONNX model to ~/.sentiment-space/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = AppConfig::load()?;

    // Log to stderr so `export` output on stdout stays clean JSON.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.server.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &config.source {
        Some(path) => tracing::debug!(path = %path.display(), "loaded config file"),
        None => tracing::info!(
            path = %sentiment_space::config::default_config_path().display(),
            "no config file, using defaults"
        ),
    }

    match cli.command {
        Command::Serve => sentiment_space::server::serve(config).await?,
        Command::Model { action } => match action {
            ModelAction::Download => cli::model_download(&config.inference).await?,
        },
        Command::Analyze { text } => cli::analyze::analyze(&config, &text).await?,
        Command::Stats => cli::stats::stats(&config)?,
        Command::Export => cli::export::export(&config)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
