//! Main entry point for the order status service.
//!
//! Loads the configuration, assembles the status engine from the configured
//! storage and identity backends and runs one command against it, printing
//! the result as JSON on stdout. Logs go to stderr.

use clap::Parser;
use status_config::Config;
use status_core::{StatusBuilder, StatusEngine, StatusFactories};
use std::path::PathBuf;

mod commands;

use commands::Command;

use status_identity::implementations::http::create_identity as create_http_identity;
use status_identity::implementations::static_tokens::create_identity as create_static_identity;
use status_storage::implementations::file::create_storage as create_file_storage;
use status_storage::implementations::memory::create_storage as create_memory_storage;

/// Command-line arguments for the order status service.
#[derive(Parser, Debug)]
#[command(name = "order-status", author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml", global = true)]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info", global = true)]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.with_writer(std::io::stderr)
		.init();

	let config_path = args
		.config
		.to_str()
		.ok_or_else(|| format!("Invalid config path: {}", args.config.display()))?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let seed_on_start = config.catalog.seed_on_start;
	let engine = build_engine(config)?;

	if seed_on_start && !matches!(args.command, Command::Seed) {
		// A failed seed must not keep the service from answering
		if let Err(e) = engine.seed_catalog().await {
			tracing::error!(error = %e, "Failed to seed status catalog");
		}
	}

	let output = args.command.execute(&engine).await?;
	println!("{}", serde_json::to_string_pretty(&output)?);
	Ok(())
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Builds the status engine with every available backend implementation.
fn build_engine(config: Config) -> Result<StatusEngine, Box<dyn std::error::Error>> {
	let storage_factories = create_factory_map!(
		status_storage::StorageInterface,
		status_storage::StorageError,
		"file" => create_file_storage,
		"memory" => create_memory_storage,
	);

	let identity_factories = create_factory_map!(
		status_identity::IdentityInterface,
		status_identity::IdentityError,
		"http" => create_http_identity,
		"static" => create_static_identity,
	);

	let factories = StatusFactories {
		storage_factories,
		identity_factories,
	};

	Ok(StatusBuilder::new(config).build(factories)?)
}
