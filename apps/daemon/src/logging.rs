use std::path::Path;

use anyhow::Context;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

#[cfg(debug_assertions)]
const CONSOLE_LOG_FILTER: LevelFilter = LevelFilter::DEBUG;

#[cfg(not(debug_assertions))]
const CONSOLE_LOG_FILTER: LevelFilter = LevelFilter::INFO;

/// Console plus daily-rolling file logging.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// whole process.
pub fn init(log_folder: &Path) -> Result<WorkerGuard, anyhow::Error> {
	std::fs::create_dir_all(log_folder)
		.with_context(|| format!("Failed to create log folder at: {}", log_folder.display()))?;

	let (non_blocking, guard) =
		tracing_appender::non_blocking(rolling::daily(log_folder, "dropwatch.log"));

	tracing_subscriber::registry()
		.with(
			EnvFilter::from_default_env()
				.add_directive("info".parse().expect("Error invalid tracing directive!"))
				.add_directive(
					"dropwatch_core=debug"
						.parse()
						.expect("Error invalid tracing directive!"),
				)
				.add_directive(
					"dropwatch=debug"
						.parse()
						.expect("Error invalid tracing directive!"),
				),
		)
		.with(fmt::layer().with_filter(CONSOLE_LOG_FILTER))
		.with(
			fmt::Layer::default()
				.with_writer(non_blocking)
				.with_ansi(false)
				.with_filter(LevelFilter::DEBUG),
		)
		.init();

	Ok(guard)
}
