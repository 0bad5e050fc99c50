use std::sync::Arc;

use ramen_sync::config::Config;
use ramen_sync::service::{ChainRegistry, Service};
use ramen_sync::sync::{EventBus, LoggingEventHandler, Syncer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
	let config = match Config::from_env() {
		Ok(config) => config,
		Err(e) => {
			eprintln!("Invalid configuration: {e}");
			std::process::exit(2);
		}
	};

	let mut filter = EnvFilter::builder()
		.with_default_directive(tracing::Level::INFO.into())
		.from_env_lossy();
	if config.debug {
		if let Ok(directive) = "ramen_sync=debug".parse() {
			filter = filter.add_directive(directive);
		}
	}
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	if let Err(e) = run(config).await {
		error!(error = %e, "Synchronizer exited with error");
		std::process::exit(1);
	}
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
	info!(?config, "Starting chain sync service");

	let registry = Arc::new(ChainRegistry::builtin()?);
	let bus = EventBus::new(config.event_bus_capacity);
	let service = Arc::new(Service::connect(config, registry).await?);

	let network = service.network().await?;
	info!(
		network = %network.title,
		chain_id = network.chain_id,
		net_type = %network.net_type(),
		height = service.block_height().await?,
		"Connected to node"
	);

	let handler = bus.register_handler(Box::new(LoggingEventHandler));
	let syncer = Syncer::new(service, bus);
	syncer.start().await?;

	tokio::signal::ctrl_c().await?;
	info!("Shutting down");

	syncer.stop().await;
	drop(syncer);
	if let Err(e) = handler.await {
		error!(error = %e, "Event handler task failed");
	}
	Ok(())
}
