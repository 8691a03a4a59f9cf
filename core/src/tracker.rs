use std::{
	collections::HashMap,
	path::{Path, PathBuf},
	time::{Duration, SystemTime},
};

use tokio::time::Instant;
use tracing::trace;

/// Snapshot of a file still being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TrackedFile {
	size: u64,
	mtime: Option<SystemTime>,
	first_seen: Instant,
	last_change: Instant,
}

/// Debounces file activity by inactivity: a file is settled once its size and
/// mtime have stopped changing for a full stability window.
///
/// The tracker owns no clock and does no I/O. Callers feed it observations
/// through [`Self::record`] and [`Self::forget`] and periodically harvest
/// [`Self::settled`] paths. Memory is bounded by the number of in-flight
/// files; settled and forgotten entries are removed immediately.
#[derive(Debug, Default)]
pub struct StabilityTracker {
	in_flight: HashMap<PathBuf, TrackedFile>,
	keep_buffer: Vec<(PathBuf, TrackedFile)>,
}

impl StabilityTracker {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers an observation of `path` at `now`.
	///
	/// A new path starts its stability window; a changed size or mtime restarts
	/// it. An observation identical to the stored one leaves the window alone,
	/// so redundant notifications for the same write never delay settling.
	/// Returns whether the stored entry changed.
	pub fn record(
		&mut self,
		path: &Path,
		size: u64,
		mtime: Option<SystemTime>,
		now: Instant,
	) -> bool {
		if let Some(file) = self.in_flight.get_mut(path) {
			if file.size == size && file.mtime == mtime {
				return false;
			}

			file.size = size;
			file.mtime = mtime;
			file.last_change = now;

			true
		} else {
			self.in_flight.insert(
				path.to_path_buf(),
				TrackedFile {
					size,
					mtime,
					first_seen: now,
					last_change: now,
				},
			);

			true
		}
	}

	/// Stops tracking `path`, reporting whether it was in flight.
	pub fn forget(&mut self, path: &Path) -> bool {
		self.in_flight.remove(path).is_some()
	}

	/// Removes and returns every path whose last change is at least `window`
	/// old at `now`.
	pub fn settled(&mut self, now: Instant, window: Duration) -> Vec<PathBuf> {
		let mut settled = Vec::new();

		for (path, file) in self.in_flight.drain() {
			if now.saturating_duration_since(file.last_change) >= window {
				trace!(
					path = %path.display(),
					total_wait = ?now.saturating_duration_since(file.first_seen),
					"File settled;"
				);
				settled.push(path);
			} else {
				self.keep_buffer.push((path, file));
			}
		}

		self.in_flight.extend(self.keep_buffer.drain(..));

		settled
	}

	/// Paths currently awaiting stability.
	pub fn tracked_paths(&self) -> Vec<PathBuf> {
		self.in_flight.keys().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.in_flight.len()
	}

	pub fn is_empty(&self) -> bool {
		self.in_flight.is_empty()
	}
}
