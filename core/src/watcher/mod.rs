use crate::{
	config::WatchConfig,
	error::EngineError,
	event::{RawEvent, RawEventKind, RootId, WatchEvent, WatchedRoot},
	resolver::RootResolver,
	router::EventRouter,
	tracker::StabilityTracker,
};

use dropwatch_utils::FileIOError;

use std::{collections::HashSet, io::ErrorKind, path::Path, pin::pin, sync::Arc};

use async_channel as chan;
use futures::StreamExt;
use futures_concurrency::stream::Merge;
use tokio::{
	fs, spawn,
	task::JoinHandle,
	time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, error, info, trace, warn};

mod source;

use source::{SourceMessage, WatchSource};

/// Watches every configured root and publishes [`WatchEvent`]s to the router.
///
/// The engine owns one [`WatchSource`] per root and a single processing task
/// that merges backend notifications with a periodic stability check. Files
/// matching the configured extension are admitted to a [`StabilityTracker`]
/// and reported ready once they stop changing; directories are reported the
/// moment they appear. When roots nest, the deepest root containing a path
/// handles its changes and the ancestors' duplicate reports are skipped.
pub struct WatchEngine {
	sources: Vec<WatchSource>,
	handle: Option<JoinHandle<()>>,
	stop_tx: chan::Sender<()>,
}

impl WatchEngine {
	/// Starts watching. Expects a configuration that already passed
	/// [`WatchConfig::validate`].
	///
	/// A root that cannot be watched does not abort startup: it is reported
	/// through a single [`WatchEvent::WatchError`] and the remaining roots
	/// keep working. [`WatchEvent::ScanComplete`] is published once every
	/// root, failed ones included, finished its initial enumeration.
	pub async fn start(
		config: WatchConfig,
		router: Arc<EventRouter>,
	) -> Result<Self, EngineError> {
		let roots = config
			.roots
			.iter()
			.enumerate()
			.map(|(id, path)| WatchedRoot {
				id: id as RootId,
				path: path.clone(),
			})
			.collect::<Vec<_>>();

		let resolver = RootResolver::new(roots.clone());

		let (events_tx, events_rx) = chan::unbounded();
		let (stop_tx, stop_rx) = chan::bounded(1);

		let mut sources = Vec::with_capacity(roots.len());
		for root in roots {
			let root_id = root.id;
			match WatchSource::new(root, &config, events_tx.clone()).await {
				Ok(source) => sources.push(source),
				Err(e) => {
					error!(?e, root_id, "Failed to start watching root;");
					events_tx
						.send(SourceMessage::Error {
							root_id,
							message: e.to_string(),
						})
						.await
						.expect("watch engine message channel unexpectedly closed");
					// A root that failed to start still counts as scanned, so
					// the healthy ones can bring the engine to ready
					events_tx
						.send(SourceMessage::ScanFinished(root_id))
						.await
						.expect("watch engine message channel unexpectedly closed");
				}
			}
		}

		let handle = spawn(async move {
			while let Err(e) = spawn(Self::handle_events(
				config.clone(),
				resolver.clone(),
				Arc::clone(&router),
				events_rx.clone(),
				stop_rx.clone(),
			))
			.await
			{
				if e.is_panic() {
					error!(?e, "Watch engine event processing task panicked;");
				} else {
					trace!("Watch engine received shutdown signal and will exit;");
					break;
				}
				trace!("Restarting watch engine event processing task...");
			}

			info!("Watch engine gracefully shutdown");
		});

		Ok(Self {
			sources,
			handle: Some(handle),
			stop_tx,
		})
	}

	/// Stops the backends, then the processing task. Events already handed to
	/// the router stay queued there; in-flight files that never settled are
	/// dropped without a report.
	pub async fn shutdown(mut self) {
		for source in &mut self.sources {
			source.close();
		}

		self.stop_tx
			.send(())
			.await
			.expect("Failed to send stop signal to watch engine");

		if let Some(handle) = self.handle.take() {
			if let Err(e) = handle.await {
				error!(?e, "Failed to join watch engine task;");
			}
		}
	}

	async fn handle_events(
		config: WatchConfig,
		resolver: RootResolver,
		router: Arc<EventRouter>,
		events_rx: chan::Receiver<SourceMessage>,
		stop_rx: chan::Receiver<()>,
	) {
		enum StreamMessage {
			NewMessage(SourceMessage),
			Tick,
			Stop,
		}

		let mut tracker = StabilityTracker::new();

		let mut pending_scans = resolver
			.roots()
			.iter()
			.map(|root| root.id)
			.collect::<HashSet<_>>();
		let mut scan_complete_emitted = pending_scans.is_empty();

		let mut check_interval = interval_at(
			Instant::now() + config.poll_interval(),
			config.poll_interval(),
		);
		check_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

		let mut msg_stream = pin!((
			events_rx.map(StreamMessage::NewMessage),
			IntervalStream::new(check_interval).map(|_| StreamMessage::Tick),
			stop_rx.map(|()| StreamMessage::Stop),
		)
			.merge());

		while let Some(msg) = msg_stream.next().await {
			match msg {
				StreamMessage::NewMessage(SourceMessage::Event { root_id, event }) => {
					// Nested roots watch overlapping trees, so every backend
					// involved reports the same change; only the owning
					// (deepest) root's report is handled
					if resolver
						.resolve(&event.path)
						.is_some_and(|owner| owner.id != root_id)
					{
						trace!(
							root_id,
							path = %event.path.display(),
							"Skipping change reported by a non-owning root;",
						);
						continue;
					}

					if config.debug_events {
						router.publish(WatchEvent::Raw(event.clone()));
					}

					if let Err(e) =
						Self::handle_raw_event(event, &config, &resolver, &mut tracker, &router)
							.await
					{
						error!(?e, "Failed to handle file system event;");
					}
				}

				StreamMessage::NewMessage(SourceMessage::Error { root_id, message }) => {
					error!(root_id, %message, "Watcher backend reported an error;");
					router.publish(WatchEvent::WatchError {
						root: root_id,
						message,
					});
				}

				StreamMessage::NewMessage(SourceMessage::ScanFinished(root_id)) => {
					trace!(root_id, "Root finished its initial scan;");
					if pending_scans.remove(&root_id)
						&& pending_scans.is_empty() && !scan_complete_emitted
					{
						scan_complete_emitted = true;
						router.publish(WatchEvent::ScanComplete);
					}
				}

				StreamMessage::Tick => {
					Self::check_in_flight(&config, &resolver, &mut tracker, &router).await;
				}

				StreamMessage::Stop => {
					debug!("Stopping watch engine event processing task");
					break;
				}
			}
		}
	}

	async fn handle_raw_event(
		RawEvent { kind, path }: RawEvent,
		config: &WatchConfig,
		resolver: &RootResolver,
		tracker: &mut StabilityTracker,
		router: &EventRouter,
	) -> Result<(), EngineError> {
		match kind {
			RawEventKind::Created | RawEventKind::Modified => {
				let Some(metadata) = entry_metadata(&path).await? else {
					// Raced with a removal; nothing left to track
					tracker.forget(&path);
					return Ok(());
				};

				if metadata.is_dir() {
					// A path can flip from file to directory between
					// notifications; the directory wins
					tracker.forget(&path);

					if kind == RawEventKind::Created {
						router.publish(WatchEvent::DirectoryAdded {
							root: resolve_root(resolver, &path),
							path,
						});
					}

					return Ok(());
				}

				if !config.matches_extension(&path) {
					return Ok(());
				}

				if tracker.record(&path, metadata.len(), metadata.modified().ok(), Instant::now())
				{
					trace!(path = %path.display(), "Tracking file activity;");
				}
			}

			RawEventKind::Removed => {
				if tracker.forget(&path) {
					trace!(path = %path.display(), "File removed before settling;");
				}
			}
		}

		Ok(())
	}

	/// Re-reads every in-flight file and reports the ones that have been
	/// quiet for a full stability window.
	async fn check_in_flight(
		config: &WatchConfig,
		resolver: &RootResolver,
		tracker: &mut StabilityTracker,
		router: &EventRouter,
	) {
		let now = Instant::now();

		for path in tracker.tracked_paths() {
			match entry_metadata(&path).await {
				Ok(Some(metadata)) if !metadata.is_dir() => {
					tracker.record(&path, metadata.len(), metadata.modified().ok(), now);
				}
				Ok(_) => {
					// Gone, or replaced by a directory
					tracker.forget(&path);
				}
				Err(e) => {
					warn!(
						?e,
						path = %path.display(),
						"Failed to re-check in-flight file, dropping it;",
					);
					tracker.forget(&path);
				}
			}
		}

		for path in tracker.settled(now, config.stability_window()) {
			router.publish(WatchEvent::FileReady {
				root: resolve_root(resolver, &path),
				path,
			});
		}
	}
}

impl Drop for WatchEngine {
	fn drop(&mut self) {
		if let Some(handle) = self.handle.take() {
			for source in &mut self.sources {
				source.close();
			}

			let stop_tx = self.stop_tx.clone();
			spawn(async move {
				stop_tx
					.send(())
					.await
					.expect("Failed to send stop signal to watch engine");

				if let Err(e) = handle.await {
					error!(?e, "Failed to join watch engine task;");
				}
			});
		}
	}
}

async fn entry_metadata(path: &Path) -> Result<Option<std::fs::Metadata>, EngineError> {
	match fs::metadata(path).await {
		Ok(metadata) => Ok(Some(metadata)),
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
		Err(e) => Err(FileIOError::from((path, e, "Failed to read entry metadata")).into()),
	}
}

fn resolve_root(resolver: &RootResolver, path: &Path) -> Option<WatchedRoot> {
	let root = resolver.resolve(path).cloned();

	if root.is_none() {
		warn!(path = %path.display(), "Path does not belong to any watched root;");
	}

	root
}
