use crate::{
	config::{WatchConfig, WatcherMode},
	error::EngineError,
	event::{RawEvent, RawEventKind, RootId, WatchedRoot},
};

use std::path::{Component, Path, PathBuf};

use async_channel as chan;
use notify::{
	event::{AccessKind, AccessMode, ModifyKind, RenameMode},
	Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher,
};
use tokio::task::spawn_blocking;
use tracing::{error, trace};

/// What a [`WatchSource`] reports back to the engine loop.
///
/// Every message carries the reporting root's id: with nested roots the
/// backends watch overlapping trees, and the engine needs to know which
/// source saw a change to keep a single root authoritative for it.
pub(super) enum SourceMessage {
	Event { root_id: RootId, event: RawEvent },
	/// The backend finished its initial enumeration of the root; from here on
	/// every notification is a live change.
	ScanFinished(RootId),
	Error { root_id: RootId, message: String },
}

/// One watched root and its filesystem notification backend.
///
/// The backend is chosen by [`WatcherMode`]: native OS notifications, or
/// periodic rescans for filesystems where those are unreliable. Either way the
/// backend thread forwards into the engine's channel, keeping backend
/// callbacks off the async runtime.
pub(super) struct WatchSource {
	root: WatchedRoot,
	watcher: Option<Box<dyn Watcher + Send>>,
}

impl WatchSource {
	/// Creates the backend and starts watching `root` recursively.
	///
	/// `watch` blocks while the backend enumerates existing entries, so it
	/// runs on the blocking pool; once it returns, the root is fully
	/// registered and [`SourceMessage::ScanFinished`] is emitted.
	pub(super) async fn new(
		root: WatchedRoot,
		config: &WatchConfig,
		events_tx: chan::Sender<SourceMessage>,
	) -> Result<Self, EngineError> {
		let mut watcher = Self::create_watcher(&root, config, events_tx.clone())?;

		let path = root.path.clone();
		let watcher = spawn_blocking(move || {
			watcher
				.watch(&path, RecursiveMode::Recursive)
				.map(|()| watcher)
		})
		.await??;

		events_tx
			.send(SourceMessage::ScanFinished(root.id))
			.await
			.expect("watch source message channel unexpectedly closed");

		trace!(root_path = %root.path.display(), "Now watching root;");

		Ok(Self {
			root,
			watcher: Some(watcher),
		})
	}

	fn create_watcher(
		root: &WatchedRoot,
		config: &WatchConfig,
		events_tx: chan::Sender<SourceMessage>,
	) -> Result<Box<dyn Watcher + Send>, EngineError> {
		let root_id = root.id;
		let root_path = root.path.clone();

		let handler = move |result: Result<Event, notify::Error>| {
			if !events_tx.is_closed() {
				match result {
					Ok(event) => {
						for raw in map_event(&root_path, event) {
							if events_tx
								.send_blocking(SourceMessage::Event {
									root_id,
									event: raw,
								})
								.is_err()
							{
								error!("Failed to send file system event to the watch engine;");
							}
						}
					}
					Err(e) => {
						if events_tx
							.send_blocking(SourceMessage::Error {
								root_id,
								message: e.to_string(),
							})
							.is_err()
						{
							error!("Failed to send watcher error to the watch engine;");
						}
					}
				}
			} else {
				error!("Tried to send file system events to a closed channel;");
			}
		};

		Ok(match config.mode {
			WatcherMode::Native => Box::new(RecommendedWatcher::new(handler, Config::default())?),
			WatcherMode::Polling => Box::new(PollWatcher::new(
				handler,
				Config::default().with_poll_interval(config.backend_scan_interval()),
			)?),
		})
	}

	/// Stops the backend. Events already in the engine channel still get
	/// processed; new ones stop arriving.
	pub(super) fn close(&mut self) {
		if let Some(mut watcher) = self.watcher.take() {
			if let Err(e) = watcher.unwatch(&self.root.path) {
				error!(
					?e,
					root_path = %self.root.path.display(),
					"Failed to stop watching root;",
				);
			} else {
				trace!(root_path = %self.root.path.display(), "Stopped watching root;");
			}
		}
	}
}

/// Flattens a backend notification into coarse per-path events, dropping
/// hidden entries at the source.
///
/// Renames count as removal of the old path and creation of the new one, so a
/// file renamed into or out of the watched extension behaves like a create or
/// a delete.
fn map_event(root_path: &Path, event: Event) -> Vec<RawEvent> {
	let Event { kind, paths, .. } = event;

	let classified: Vec<(RawEventKind, PathBuf)> = match kind {
		EventKind::Create(_) => paths
			.into_iter()
			.map(|path| (RawEventKind::Created, path))
			.collect(),

		EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
			match <[PathBuf; 2]>::try_from(paths) {
				Ok([from, to]) => {
					vec![(RawEventKind::Removed, from), (RawEventKind::Created, to)]
				}
				// Both-mode renames carry exactly two paths; anything else is
				// a backend quirk, so treat every path as appearing
				Err(paths) => paths
					.into_iter()
					.map(|path| (RawEventKind::Created, path))
					.collect(),
			}
		}

		EventKind::Modify(ModifyKind::Name(RenameMode::From)) => paths
			.into_iter()
			.map(|path| (RawEventKind::Removed, path))
			.collect(),

		EventKind::Modify(ModifyKind::Name(_)) => paths
			.into_iter()
			.map(|path| (RawEventKind::Created, path))
			.collect(),

		EventKind::Modify(_)
		| EventKind::Access(AccessKind::Close(AccessMode::Write))
		| EventKind::Any => paths
			.into_iter()
			.map(|path| (RawEventKind::Modified, path))
			.collect(),

		EventKind::Remove(_) => paths
			.into_iter()
			.map(|path| (RawEventKind::Removed, path))
			.collect(),

		_ => Vec::new(),
	};

	classified
		.into_iter()
		.filter(|(_, path)| !is_hidden(root_path, path))
		.map(|(kind, path)| RawEvent { kind, path })
		.collect()
}

/// Whether any path component below the root starts with a dot.
fn is_hidden(root_path: &Path, path: &Path) -> bool {
	path.strip_prefix(root_path)
		.map(|relative| {
			relative.components().any(|component| {
				matches!(
					component,
					Component::Normal(name) if name.to_string_lossy().starts_with('.')
				)
			})
		})
		.unwrap_or(false)
}
