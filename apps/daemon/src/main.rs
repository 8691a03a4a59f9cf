use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::Parser;
use dropwatch_core::{EventRouter, LogSink, WatchEngine};
use tokio::signal;
use tracing::{error, info};

mod config;
mod logging;
mod sinks;

use config::DaemonConfig;
use sinks::NotificationSink;

#[derive(Debug, Parser)]
#[command(
	name = "dropwatch",
	about = "Watches drop folders and reports files that finished copying"
)]
struct Args {
	/// Path to the JSON configuration file
	#[arg(short, long, default_value = "config.json")]
	config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
	let args = Args::parse();

	let config = match DaemonConfig::load(&args.config).await {
		Ok(config) => config,
		Err(e) => {
			// Logging is not up yet, so this goes straight to stderr
			eprintln!("FATAL ERROR: {e}");
			return ExitCode::FAILURE;
		}
	};

	let _log_guard = match logging::init(&config.log_folder) {
		Ok(guard) => guard,
		Err(e) => {
			eprintln!("FATAL ERROR: {e:#}");
			return ExitCode::FAILURE;
		}
	};

	if let Err(e) = run(config).await {
		error!(?e, "Watcher service failed;");
		eprintln!("FATAL ERROR: {e:#}");
		return ExitCode::FAILURE;
	}

	ExitCode::SUCCESS
}

async fn run(config: DaemonConfig) -> Result<(), anyhow::Error> {
	// Runs after logging is up, so a bad watch folder lands in the log file
	// as well as on stderr
	let config = config.check_watch_folders().await?;

	info!("Watcher service started.");
	for root in &config.watch.roots {
		info!("Watching target folder: {}", root.display());
	}

	let router = Arc::new(EventRouter::new(vec![
		Box::new(LogSink),
		Box::new(NotificationSink::new(
			config.notifications.clone(),
			&config.watch.extension,
		)),
	]));

	let engine = WatchEngine::start(config.watch, Arc::clone(&router)).await?;

	wait_for_shutdown().await;

	info!("Shutdown signal received. Closing watcher...");
	engine.shutdown().await;
	router.shutdown().await;
	info!("Watcher closed. Exiting.");

	Ok(())
}

async fn wait_for_shutdown() {
	let ctrl_c = async {
		signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
