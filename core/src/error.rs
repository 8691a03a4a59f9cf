use std::path::PathBuf;

use dropwatch_utils::FileIOError;
use thiserror::Error;

/// Problems with the watch configuration. These are fatal for the host: they
/// are surfaced before the engine starts and the engine never sees them.
#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("No watch folders configured")]
	NoRoots,
	#[error("Watched file extension must not be empty")]
	EmptyExtension,
	#[error("Watch folder not found at: {}", .0.display())]
	RootNotFound(PathBuf),
	#[error("Watch folder is not a directory: {}", .0.display())]
	RootNotADirectory(PathBuf),
	#[error("Watcher intervals must be greater than zero")]
	ZeroInterval,
}

#[derive(Error, Debug)]
pub enum EngineError {
	#[error("Watcher error: (error: {0})")]
	Watcher(#[from] notify::Error),
	#[error("Watcher task failed: (error: {0})")]
	TaskJoin(#[from] tokio::task::JoinError),
	#[error(transparent)]
	FileIO(#[from] FileIOError),
}
