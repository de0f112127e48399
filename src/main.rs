//! WolfBlob - HTTP Gateway for Azure Blob Storage
//!
//! Serves container management, file listing, uploads and streamed
//! downloads for one storage account.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfblob::api::HttpServer;
use wolfblob::config::WolfBlobConfig;
use wolfblob::error::{Error, Result};
use wolfblob::storage;

/// WolfBlob - HTTP Gateway for Azure Blob Storage
#[derive(Parser)]
#[command(name = "wolfblob")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (optional; environment overrides apply)
    #[arg(short, long, default_value = "wolfblob.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); defaults to the config value
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway (default)
    Start,

    /// Write a sample configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfblob.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Load and validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Start) {
        Commands::Start => run_start(&cli.config, cli.log_level.as_deref()).await,
        Commands::Init { output, force } => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), "pretty");
            run_init(&output, force)
        }
        Commands::Validate => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), "pretty");
            run_validate(&cli.config)
        }
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Start the gateway
async fn run_start(config_path: &Path, log_level: Option<&str>) -> Result<()> {
    let config = match WolfBlobConfig::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            init_logging(log_level.unwrap_or("info"), "pretty");
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            return Err(e);
        }
    };

    init_logging(
        log_level.unwrap_or(config.logging.level.as_str()),
        &config.logging.format,
    );
    tracing::info!("Starting WolfBlob...");

    if let Err(e) = std::fs::create_dir_all(&config.storage.staging_dir) {
        tracing::error!(
            "Failed to create staging directory {:?}: {}",
            config.storage.staging_dir,
            e
        );
        return Err(e.into());
    }

    let store = match storage::open_store(&config.storage) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to initialize {} backend: {}", config.storage.backend, e);
            return Err(e);
        }
    };

    let server = HttpServer::new(&config, store);
    if let Err(e) = server.start().await {
        tracing::error!("HTTP server error: {}", e);
        return Err(e);
    }

    tracing::info!("WolfBlob stopped");
    Ok(())
}

/// Write a sample configuration file
fn run_init(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(Error::Config(format!(
            "{:?} already exists (use --force to overwrite)",
            output
        )));
    }

    std::fs::write(output, WolfBlobConfig::sample()?)?;
    tracing::info!("Configuration written to {:?}", output);
    println!("Created configuration file: {}", output.display());
    println!("Edit [storage] connection_string, or set AZURE_STORAGE_CONN, before starting.");
    Ok(())
}

/// Validate configuration
fn run_validate(config_path: &Path) -> Result<()> {
    let config = WolfBlobConfig::load(config_path)?;

    println!("Configuration is valid");
    println!("  Listen:      {}", config.bind_address());
    println!("  Backend:     {}", config.storage.backend);
    println!("  Container:   {}", config.storage.container);
    println!("  Staging dir: {}", config.storage.staging_dir.display());
    println!("  Max upload:  {} MB", config.server.max_upload_mb);

    if let Some(raw) = config.storage.connection_string.as_deref() {
        let connection = storage::ConnectionString::parse(raw)?;
        println!("  Endpoint:    {}", connection.blob_endpoint);
    }

    Ok(())
}
