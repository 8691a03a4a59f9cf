use std::{
	fmt,
	path::{Path, PathBuf},
};

pub type RootId = i32;

/// One configured watch directory. Created at startup, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedRoot {
	pub id: RootId,
	pub path: PathBuf,
}

impl WatchedRoot {
	/// Strips this root's prefix from `path`, falling back to the full path
	/// when `path` lives outside the root.
	pub fn relative_of<'a>(&self, path: &'a Path) -> &'a Path {
		path.strip_prefix(&self.path).unwrap_or(path)
	}
}

/// Normalized filesystem notification, already stripped of backend-specific
/// detail by the watch source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
	Created,
	Modified,
	Removed,
}

impl fmt::Display for RawEventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Created => "created",
			Self::Modified => "modified",
			Self::Removed => "removed",
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
	pub kind: RawEventKind,
	pub path: PathBuf,
}

/// Events the engine emits to sinks.
///
/// `Raw` is only produced when debug event logging is enabled and is the only
/// variant the router is allowed to drop under backpressure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
	/// A file matching the watched extension stopped changing for a full
	/// stability window.
	FileReady {
		path: PathBuf,
		root: Option<WatchedRoot>,
	},
	/// A directory appeared under a watched root. Emitted immediately, with
	/// no stability delay.
	DirectoryAdded {
		path: PathBuf,
		root: Option<WatchedRoot>,
	},
	/// Every configured root finished its initial tree enumeration.
	ScanComplete,
	/// A single root's watcher reported a failure. The other roots keep
	/// going.
	WatchError { root: RootId, message: String },
	/// Verbatim raw notification, for debug logging.
	Raw(RawEvent),
}

impl WatchEvent {
	/// Path relative to the owning root, or the absolute path when no root
	/// claimed it. `None` for events that carry no path.
	pub fn relative_path(&self) -> Option<&Path> {
		match self {
			Self::FileReady { path, root } | Self::DirectoryAdded { path, root } => Some(
				root.as_ref()
					.map(|root| root.relative_of(path))
					.unwrap_or(path),
			),
			Self::Raw(RawEvent { path, .. }) => Some(path),
			Self::ScanComplete | Self::WatchError { .. } => None,
		}
	}

	pub(crate) fn is_debug_only(&self) -> bool {
		matches!(self, Self::Raw(_))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;

	fn root() -> WatchedRoot {
		WatchedRoot {
			id: 0,
			path: PathBuf::from("/watch/inbound"),
		}
	}

	#[test]
	fn relative_path_strips_owning_root() {
		let event = WatchEvent::FileReady {
			path: PathBuf::from("/watch/inbound/day1/a.dat"),
			root: Some(root()),
		};

		assert_eq!(event.relative_path(), Some(Path::new("day1/a.dat")));
	}

	#[test]
	fn relative_path_falls_back_to_absolute_without_root() {
		let event = WatchEvent::DirectoryAdded {
			path: PathBuf::from("/elsewhere/day1"),
			root: None,
		};

		assert_eq!(event.relative_path(), Some(Path::new("/elsewhere/day1")));
	}

	#[test]
	fn pathless_events_have_no_relative_path() {
		assert_eq!(WatchEvent::ScanComplete.relative_path(), None);
	}
}
