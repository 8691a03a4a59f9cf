use crate::error::ConfigError;

use std::{
	path::{Path, PathBuf},
	time::Duration,
};

use serde::{Deserialize, Serialize};

pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_BINARY_SCAN_INTERVAL_MS: u64 = 3000;
pub const DEFAULT_STABILITY_WINDOW_MS: u64 = 5000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Extensions rescanned at the slower binary interval in polling mode.
const BINARY_EXTENSIONS: &[&str] = &[
	"avi", "gz", "iso", "mkv", "mov", "mp4", "mxf", "wav", "zip",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatcherMode {
	/// OS-native change notifications (inotify, FSEvents, ReadDirectoryChangesW).
	#[default]
	Native,
	/// Periodic directory rescans, for network mounts and other filesystems
	/// where native notifications are unreliable.
	Polling,
}

/// Validated watch parameters handed to [`crate::WatchEngine::start`].
///
/// Interval fields are milliseconds so the host can deserialize them straight
/// from its configuration file; use the accessor methods to get [`Duration`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
	/// Absolute paths of the directories to watch.
	pub roots: Vec<PathBuf>,
	/// Extension of the files that get reported, with or without the leading
	/// dot. Matching is case-insensitive.
	pub extension: String,
	pub mode: WatcherMode,
	/// Directory rescan cadence in polling mode.
	pub scan_interval_ms: u64,
	/// Rescan cadence in polling mode when the watched extension is a known
	/// binary format.
	pub binary_scan_interval_ms: u64,
	/// How long a file must go without size/mtime changes before it is
	/// reported ready.
	pub stability_window_ms: u64,
	/// How often in-flight files are re-checked for stability.
	pub poll_interval_ms: u64,
	/// Route every raw filesystem notification to the sinks as well.
	pub debug_events: bool,
}

impl WatchConfig {
	pub fn new(roots: Vec<PathBuf>, extension: impl Into<String>) -> Self {
		Self {
			roots,
			extension: extension.into(),
			mode: WatcherMode::default(),
			scan_interval_ms: DEFAULT_SCAN_INTERVAL_MS,
			binary_scan_interval_ms: DEFAULT_BINARY_SCAN_INTERVAL_MS,
			stability_window_ms: DEFAULT_STABILITY_WINDOW_MS,
			poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
			debug_events: false,
		}
	}

	pub fn stability_window(&self) -> Duration {
		Duration::from_millis(self.stability_window_ms)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn scan_interval(&self) -> Duration {
		Duration::from_millis(self.scan_interval_ms)
	}

	pub fn binary_scan_interval(&self) -> Duration {
		Duration::from_millis(self.binary_scan_interval_ms)
	}

	/// Rescan interval handed to the polling backend, picked by whether the
	/// watched extension is a known binary format.
	pub fn backend_scan_interval(&self) -> Duration {
		if BINARY_EXTENSIONS
			.iter()
			.any(|ext| self.normalized_extension().eq_ignore_ascii_case(ext))
		{
			self.binary_scan_interval()
		} else {
			self.scan_interval()
		}
	}

	/// The configured extension without its leading dot.
	pub fn normalized_extension(&self) -> &str {
		self.extension.trim_start_matches('.')
	}

	/// Whether `path`'s file name ends with the watched extension on a dot
	/// boundary, compared case-insensitively. Multi-segment suffixes like
	/// `.tar.gz` match as a whole.
	pub fn matches_extension(&self, path: &Path) -> bool {
		let Some(name) = path.file_name() else {
			return false;
		};

		let name = name.to_string_lossy().to_ascii_lowercase();
		let suffix = format!(".{}", self.normalized_extension().to_ascii_lowercase());

		// A bare ".<extension>" name has no stem and is not a match
		name.len() > suffix.len() && name.ends_with(&suffix)
	}

	/// Startup-time sanity checks. The engine assumes a validated
	/// configuration; hosts must call this before [`crate::WatchEngine::start`].
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.roots.is_empty() {
			return Err(ConfigError::NoRoots);
		}

		if self.normalized_extension().is_empty() {
			return Err(ConfigError::EmptyExtension);
		}

		if self.scan_interval_ms == 0
			|| self.binary_scan_interval_ms == 0
			|| self.poll_interval_ms == 0
		{
			return Err(ConfigError::ZeroInterval);
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;

	fn config(extension: &str) -> WatchConfig {
		WatchConfig::new(vec![PathBuf::from("/watch")], extension)
	}

	#[test]
	fn defaults_match_documented_values() {
		let config = config(".dat");

		assert_eq!(config.stability_window(), Duration::from_millis(5000));
		assert_eq!(config.poll_interval(), Duration::from_millis(1000));
		assert_eq!(config.scan_interval(), Duration::from_millis(2000));
		assert_eq!(config.mode, WatcherMode::Native);
		assert!(!config.debug_events);
	}

	#[test]
	fn extension_matching_is_case_insensitive_and_dot_agnostic() {
		for extension in [".mxf", "mxf", ".MXF"] {
			let config = config(extension);

			assert!(config.matches_extension(Path::new("/watch/clip.mxf")));
			assert!(config.matches_extension(Path::new("/watch/CLIP.MXF")));
			assert!(!config.matches_extension(Path::new("/watch/clip.tmp")));
			assert!(!config.matches_extension(Path::new("/watch/mxf")));
		}
	}

	#[test]
	fn extension_must_be_a_full_path_segment_suffix() {
		let config = config(".dat");

		// "xdat" ends with "dat" as a string but is not the file's extension
		assert!(!config.matches_extension(Path::new("/watch/file.xdat")));
		assert!(!config.matches_extension(Path::new("/watch/filedat")));
		assert!(!config.matches_extension(Path::new("/watch/.dat")));
	}

	#[test]
	fn multi_segment_extensions_match_on_the_full_suffix() {
		let config = config(".tar.gz");

		assert!(config.matches_extension(Path::new("/watch/backup.tar.gz")));
		assert!(config.matches_extension(Path::new("/watch/BACKUP.TAR.GZ")));
		assert!(!config.matches_extension(Path::new("/watch/backup.gz")));
		assert!(!config.matches_extension(Path::new("/watch/backup.xtar.gz")));
		assert!(!config.matches_extension(Path::new("/watch/.tar.gz")));
	}

	#[test]
	fn binary_extensions_use_the_slower_scan_interval() {
		assert_eq!(
			config(".mxf").backend_scan_interval(),
			Duration::from_millis(DEFAULT_BINARY_SCAN_INTERVAL_MS)
		);
		assert_eq!(
			config(".txt").backend_scan_interval(),
			Duration::from_millis(DEFAULT_SCAN_INTERVAL_MS)
		);
	}

	#[test]
	fn validate_rejects_degenerate_configurations() {
		assert!(matches!(
			WatchConfig::new(Vec::new(), ".dat").validate(),
			Err(ConfigError::NoRoots)
		));

		assert!(matches!(
			config(".").validate(),
			Err(ConfigError::EmptyExtension)
		));

		let mut zero_poll = config(".dat");
		zero_poll.poll_interval_ms = 0;
		assert!(matches!(
			zero_poll.validate(),
			Err(ConfigError::ZeroInterval)
		));

		assert!(config(".dat").validate().is_ok());
	}
}
