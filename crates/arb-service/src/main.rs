use anyhow::{Context, Result};
use arb_config::{ArbConfig, ConfigLoader};
use arb_selector::Opportunity;
use arb_storage::{create_storage, StorageService};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod service;

use service::ArbService;

#[derive(Parser)]
#[command(name = "arb-executor")]
#[command(about = "Flash-loan arbitrage executor", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/example.toml")]
	config: PathBuf,

	/// Log level used when the configuration does not load
	#[arg(long)]
	log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the HTTP service
	Start,
	/// Validate the configuration file
	Validate,
	/// Run entry-point selection over a JSON file of opportunities
	Select {
		#[arg(value_name = "FILE")]
		file: PathBuf,
		/// Lender liquidity for the loan asset
		#[arg(long)]
		available: Option<String>,
		#[arg(long, default_value_t = 18)]
		decimals: u8,
	},
	/// Decode hex instruction bytes and print them as JSON
	Decode {
		#[arg(value_name = "HEX")]
		hex: String,
	},
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let loaded = load_config(&cli.config).await;
	setup_tracing(log_level(loaded.as_ref().ok(), cli.log_level.as_deref()))?;

	match cli.command {
		Some(Commands::Start) | None => start_service(loaded?).await,
		Some(Commands::Validate) => validate_config(&loaded?),
		Some(Commands::Select {
			ref file,
			ref available,
			decimals,
		}) => run_selection(loaded?, file, available.as_deref(), decimals).await,
		Some(Commands::Decode { ref hex }) => decode(hex),
	}
}

async fn load_config(path: &Path) -> Result<ArbConfig> {
	ConfigLoader::new()
		.with_file(path)
		.load()
		.await
		.context("Failed to load configuration")
}

/// The configured level wins; `--log-level` only covers an unloadable
/// configuration. `RUST_LOG` overrides both.
fn log_level<'a>(config: Option<&'a ArbConfig>, flag: Option<&'a str>) -> &'a str {
	config
		.map(|c| c.log_level.as_str())
		.or(flag)
		.unwrap_or("info")
}

async fn build_service(config: ArbConfig) -> Result<ArbService> {
	let backend = create_storage(&config.storage.backend, Some(config.storage.path.clone()))
		.context("Failed to create storage backend")?;
	ArbService::new(config, StorageService::new(backend)).await
}

async fn start_service(config: ArbConfig) -> Result<()> {
	info!("Starting arbitrage executor");
	info!("Network: {}", config.network());
	info!("Engine address: {}", config.engine.address);

	let host = config.api.host.clone();
	let port = config.api.port;
	let service = Arc::new(build_service(config).await?);

	let mut events = service.events().subscribe();
	let event_handle = tokio::spawn(async move {
		loop {
			match events.recv().await {
				Ok(event) => debug!(?event, "event"),
				Err(RecvError::Lagged(skipped)) => debug!(skipped, "event log lagged"),
				Err(RecvError::Closed) => break,
			}
		}
	});

	let http_service = service.clone();
	let http_handle =
		tokio::spawn(async move { api::start_http_server(http_service, &host, port).await });

	info!("Arbitrage executor started");
	tokio::select! {
		_ = setup_shutdown_signal() => {
			info!("Shutdown signal received, stopping services...");
		}
		result = http_handle => {
			match result {
				Ok(Err(e)) => error!("HTTP server failed: {:#}", e),
				Err(e) => error!("HTTP server task panicked: {}", e),
				Ok(Ok(())) => {}
			}
		}
	}

	event_handle.abort();
	service.persist().await.context("Failed to persist state")?;
	info!("Arbitrage executor stopped");
	Ok(())
}

fn validate_config(config: &ArbConfig) -> Result<()> {
	info!("Configuration is valid");
	info!("Network: {}", config.network());
	if let Some(push) = &config.lenders.push {
		info!("  Push lender: {}", push.address);
	}
	if let Some(pull) = &config.lenders.pull {
		info!("  Pull lender: {}", pull.address);
	}
	info!(
		"  Registry: {} venues, {} assets",
		config.registry.venues.len(),
		config.registry.assets.len()
	);
	info!(
		"  Ledger: {} venues, {} balances",
		config.ledger.venues.len(),
		config.ledger.balances.len()
	);
	Ok(())
}

async fn run_selection(
	mut config: ArbConfig,
	file: &Path,
	available: Option<&str>,
	decimals: u8,
) -> Result<()> {
	// selection never needs persisted state
	config.storage.backend = "memory".to_string();
	let service = build_service(config).await?;

	let content = tokio::fs::read_to_string(file)
		.await
		.with_context(|| format!("Failed to read {:?}", file))?;
	let opportunities: Vec<Opportunity> =
		serde_json::from_str(&content).context("Failed to parse opportunities")?;
	let available = available
		.map(arb_types::parse_amount)
		.transpose()
		.map_err(|e| anyhow::anyhow!("Invalid --available amount: {}", e))?;

	let outcomes = service
		.select(&opportunities, available, decimals, ArbService::now())
		.await;
	println!("{}", serde_json::to_string_pretty(&outcomes)?);
	Ok(())
}

fn decode(hex: &str) -> Result<()> {
	let bytes = hex::decode(hex.trim_start_matches("0x")).context("Invalid hex")?;
	let instructions =
		arb_codec::decode_instructions(&bytes).context("Failed to decode instructions")?;
	println!("{}", serde_json::to_string_pretty(&instructions)?);
	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!("Failed to listen for Ctrl+C: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				error!("Failed to install SIGTERM handler: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
