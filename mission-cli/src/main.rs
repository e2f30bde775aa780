//! Mission Engine Command Line Interface
//!
//! Configuration is read from MISSION_* environment variables; flags
//! override them.
//!
//! Usage:
//!   missiond serve          - Start the API server and the event processor
//!   missiond process        - Run the event processor without the API
//!   missiond seed-config    - Load a tier configuration from a JSON file
//!   missiond show-config    - Print the stored tier configuration
//!   missiond stats          - Print storage statistics
//!   missiond status         - Query a running server's health endpoint

use clap::{Parser, Subcommand};
use mission_api::{run_server, ApiConfig};
use mission_core::{
    open_storage, EventProcessor, MissionConfig, MissionEngine, ServiceConfig, StorageConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "missiond")]
#[command(about = "Wager mission progression engine")]
#[command(version)]
struct Cli {
    /// Sled data directory; empty keeps everything in memory
    #[arg(long, env = "MISSION_DATA_DIR", default_value = "./mission_data")]
    data_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server and the event processor
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Tier configuration loaded before serving
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run the event processor without the API
    Process,

    /// Validate and store a tier configuration
    SeedConfig {
        /// JSON file holding the configuration
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print the stored tier configuration
    ShowConfig,

    /// Print storage statistics
    Stats,

    /// Show the health of a running server
    Status {
        /// API server URL
        #[arg(short, long, default_value = "http://localhost:3000")]
        api_url: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mission_cli=info,mission_api=info,mission_core=info".into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run_command(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_command(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Serve { host, port, config } => {
            let mut api_config = ApiConfig::from_env();
            if let Some(host) = host {
                api_config.host = host;
            }
            if let Some(port) = port {
                api_config.port = port;
            }

            let engine = build_engine(&cli.data_dir, api_config.public_base_url.clone())?;
            if let Some(path) = config {
                seed_config(&engine, &path).await?;
            }

            println!(
                "Starting mission server on {}:{}...",
                api_config.host, api_config.port
            );

            let processor = EventProcessor::new(engine.clone()).start();
            let served = run_server(api_config, engine, shutdown_signal()).await;

            processor.stop().await;
            served
        }

        Commands::Process => {
            let engine = build_engine(&cli.data_dir, None)?;
            engine.mission_config().await?;

            println!("Starting event processor...");
            let processor = EventProcessor::new(engine).start();
            shutdown_signal().await;
            processor.stop().await;
            Ok(())
        }

        Commands::SeedConfig { file } => {
            let engine = build_engine(&cli.data_dir, None)?;
            seed_config(&engine, &file).await
        }

        Commands::ShowConfig => {
            let engine = build_engine(&cli.data_dir, None)?;
            match engine.get_config().await? {
                Some(config) => println!("{}", serde_json::to_string_pretty(&config)?),
                None => println!("No tier configuration stored."),
            }
            Ok(())
        }

        Commands::Stats => {
            let engine = build_engine(&cli.data_dir, None)?;
            let stats = engine.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }

        Commands::Status { api_url } => {
            println!("Checking mission server status at {}...", api_url);

            let client = reqwest::Client::new();
            let response = client
                .get(format!("{}/health", api_url.trim_end_matches('/')))
                .send()
                .await?
                .json::<serde_json::Value>()
                .await?;

            println!("Status: {}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
    }
}

/// Build the engine from the environment and the chosen data directory
fn build_engine(data_dir: &str, public_base_url: Option<String>) -> CliResult<Arc<MissionEngine>> {
    let mut config = ServiceConfig::from_env();
    if let Some(url) = public_base_url {
        config.provider.callback_base_url = url;
    }

    let storage_config = StorageConfig {
        data_dir: data_dir.to_string(),
        ..StorageConfig::from_env()
    };
    if storage_config.is_memory() {
        info!("Using in-memory storage");
    } else {
        info!("Using sled storage at {}", storage_config.data_dir);
    }

    let engine = MissionEngine::builder()
        .config(config)
        .storage(open_storage(&storage_config)?)
        .build()?;

    Ok(Arc::new(engine))
}

async fn seed_config(engine: &MissionEngine, path: &Path) -> CliResult<()> {
    let raw = tokio::fs::read_to_string(path).await?;
    let config: MissionConfig = serde_json::from_str(&raw)?;
    let saved = engine.save_config(config).await?;

    println!(
        "Stored tier configuration with {} tiers from {}",
        saved.tiers.len(),
        path.display()
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
