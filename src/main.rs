use clap::{Parser, Subcommand};
use doc_ingest::app::IngestCoordinator;
use doc_ingest::config::Config;
use doc_ingest::constants::DEFAULT_CONFIG_PATH;
use doc_ingest::logging::init_logging;
use doc_ingest::observability::init_metrics;
use doc_ingest::rate_gate::RateGate;
use doc_ingest::server::{start_server, AppState};
use doc_ingest::storage;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "doc_ingest")]
#[command(about = "Rate-gated document ingestion service")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP ingestion server
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenv::dotenv().ok();

    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Serve { port } => {
            let _log_guard = init_logging(&config.logging);
            match config.source() {
                Some(path) => info!("Loaded configuration from {}", path.display()),
                None => info!(
                    "No config file at {}, using defaults",
                    cli.config.display()
                ),
            }
            init_metrics();

            // Fail fast on a bad limit or window before anything binds.
            let gate = Arc::new(RateGate::from_config(&config.rate_limit)?);
            info!(
                limit = gate.limit(),
                window_ms = gate.window().as_millis() as u64,
                "Rate gate configured"
            );

            let sink = storage::open(&config.storage)?;
            let coordinator = Arc::new(IngestCoordinator::new(gate, sink));

            let shutdown = CancellationToken::new();
            let state = AppState {
                coordinator,
                shutdown: shutdown.clone(),
                max_wait: config.rate_limit.max_wait(),
            };

            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("Shutdown requested, releasing parked requests");
                        shutdown.cancel();
                    }
                    Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
                }
            });

            let port = port.unwrap_or(config.server.port);
            start_server(state, &config.server.host, port).await?;
        }
        Commands::CheckConfig => {
            let gate = RateGate::from_config(&config.rate_limit)?;
            println!(
                "Configuration OK: {} request(s) per {:?}, storage={:?} ({})",
                gate.limit(),
                gate.window(),
                config.storage.backend,
                config.storage.path.display()
            );
        }
    }

    Ok(())
}
