//! BlueChat CLI: the main entry point.
//!
//! Commands:
//! - `serve`: Start the chat gateway
//! - `onboard`: Write a default config file
//! - `doctor`: Diagnose configuration, credentials and knowledge base
//! - `search`: Show what the retriever finds for a query
//! - `import`: Convert the Bluebook markdown into the knowledge document

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "bluechat",
    about = "BlueChat: retrieval-augmented chat gateway for the JovenesSTEM Bluebook",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.bluechat/config.toml)
    #[arg(short, long, global = true, env = "BLUECHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP chat gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,

        /// Override the backend kind (remote or local)
        #[arg(short, long)]
        backend: Option<String>,
    },

    /// Write a default config file
    Onboard,

    /// Diagnose system health
    Doctor {
        /// Also contact the backend
        #[arg(long)]
        ping: bool,
    },

    /// Run the retriever against the knowledge base
    Search {
        /// The query text
        query: String,
    },

    /// Convert the Bluebook markdown into a knowledge document
    Import {
        /// Markdown source
        input: PathBuf,

        /// Output JSON path (defaults to the configured knowledge path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve {
            port,
            host,
            backend,
        } => commands::serve::run(config_path, port, host, backend).await?,
        Commands::Onboard => commands::onboard::run(config_path).await?,
        Commands::Doctor { ping } => commands::doctor::run(config_path, ping).await?,
        Commands::Search { query } => commands::search::run(config_path, &query).await?,
        Commands::Import { input, output } => {
            commands::import::run(config_path, &input, output.as_deref()).await?
        }
    }

    Ok(())
}
