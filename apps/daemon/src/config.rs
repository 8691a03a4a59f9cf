use dropwatch_core::{
	config::{
		DEFAULT_BINARY_SCAN_INTERVAL_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_SCAN_INTERVAL_MS,
		DEFAULT_STABILITY_WINDOW_MS,
	},
	ConfigError, WatchConfig, WatcherMode,
};
use dropwatch_utils::FileIOError;

use std::{
	io::ErrorKind,
	mem,
	path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

/// On-disk layout of the JSON configuration file.
#[derive(Debug, Deserialize)]
struct ConfigFile {
	watch_folders: Vec<PathBuf>,
	extension: String,
	#[serde(default)]
	watcher: WatcherSettings,
	#[serde(default)]
	notifications: NotificationSettings,
	#[serde(default = "default_log_folder")]
	log_folder: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct WatcherSettings {
	mode: WatcherMode,
	scan_interval_ms: u64,
	binary_scan_interval_ms: u64,
	stability_window_ms: u64,
	poll_interval_ms: u64,
	debug_events: bool,
}

impl Default for WatcherSettings {
	fn default() -> Self {
		Self {
			mode: WatcherMode::default(),
			scan_interval_ms: DEFAULT_SCAN_INTERVAL_MS,
			binary_scan_interval_ms: DEFAULT_BINARY_SCAN_INTERVAL_MS,
			stability_window_ms: DEFAULT_STABILITY_WINDOW_MS,
			poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
			debug_events: false,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
	/// Sound file handed to the player command on each notification.
	pub sound_path: Option<PathBuf>,
	pub icon_path: Option<PathBuf>,
	/// Override for the sound player binary; defaults per platform.
	pub player: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
	#[error(transparent)]
	FileIO(#[from] FileIOError),
	#[error("Failed to parse configuration file: {0}")]
	Parse(#[from] serde_json::Error),
	#[error(transparent)]
	Invalid(#[from] ConfigError),
}

/// Daemon configuration with every path made absolute against the config
/// file's directory. Watch folders are checked and canonicalized by
/// [`Self::check_watch_folders`] before the engine starts.
#[derive(Debug)]
pub struct DaemonConfig {
	pub watch: WatchConfig,
	pub notifications: NotificationSettings,
	pub log_folder: PathBuf,
}

impl DaemonConfig {
	/// Reads and parses the configuration at `path`. Relative paths in the
	/// file resolve against the file's own directory.
	///
	/// Watch folders are only made absolute here, not checked: the log folder
	/// is known as soon as the file parses, so hosts can bring logging up
	/// first and have [`Self::check_watch_folders`] failures land in the log
	/// file too.
	pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
		let path = path.as_ref();

		let bytes = fs::read(path)
			.await
			.map_err(|e| FileIOError::from((path, e, "Failed to read configuration file")))?;

		let file = serde_json::from_slice::<ConfigFile>(&bytes)?;

		let base = path.parent().unwrap_or(Path::new("."));

		Ok(Self {
			watch: WatchConfig {
				roots: file
					.watch_folders
					.into_iter()
					.map(|folder| absolutize(base, folder))
					.collect(),
				extension: file.extension,
				mode: file.watcher.mode,
				scan_interval_ms: file.watcher.scan_interval_ms,
				binary_scan_interval_ms: file.watcher.binary_scan_interval_ms,
				stability_window_ms: file.watcher.stability_window_ms,
				poll_interval_ms: file.watcher.poll_interval_ms,
				debug_events: file.watcher.debug_events,
			},
			notifications: NotificationSettings {
				sound_path: file
					.notifications
					.sound_path
					.map(|sound_path| absolutize(base, sound_path)),
				icon_path: file
					.notifications
					.icon_path
					.map(|icon_path| absolutize(base, icon_path)),
				player: file.notifications.player,
			},
			log_folder: absolutize(base, file.log_folder),
		})
	}

	/// Checks that every watch folder exists and is a directory, canonicalizes
	/// them so backend event paths share their prefix, and validates the
	/// engine parameters.
	pub async fn check_watch_folders(mut self) -> Result<Self, ConfigLoadError> {
		let mut roots = Vec::with_capacity(self.watch.roots.len());
		for folder in mem::take(&mut self.watch.roots) {
			roots.push(check_watch_folder(folder).await?);
		}
		self.watch.roots = roots;

		self.watch.validate()?;

		Ok(self)
	}
}

async fn check_watch_folder(folder: PathBuf) -> Result<PathBuf, ConfigLoadError> {
	match fs::metadata(&folder).await {
		Ok(metadata) if metadata.is_dir() => fs::canonicalize(&folder).await.map_err(|e| {
			FileIOError::from((folder, e, "Failed to canonicalize watch folder")).into()
		}),
		Ok(_) => Err(ConfigError::RootNotADirectory(folder).into()),
		Err(e) if e.kind() == ErrorKind::NotFound => Err(ConfigError::RootNotFound(folder).into()),
		Err(e) => {
			Err(FileIOError::from((folder, e, "Failed to read watch folder metadata")).into())
		}
	}
}

fn absolutize(base: &Path, path: PathBuf) -> PathBuf {
	if path.is_absolute() {
		path
	} else {
		base.join(path)
	}
}

fn default_log_folder() -> PathBuf {
	PathBuf::from("./logs")
}
