use crate::event::WatchEvent;

use std::{collections::VecDeque, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::{
	spawn,
	sync::{Mutex, Notify},
	task::JoinHandle,
	time::timeout,
};
use tracing::{debug, error, info, trace};

const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A consumer of [`WatchEvent`]s, registered with an [`EventRouter`].
///
/// Sinks run on the router's dispatch task, so a slow sink delays delivery to
/// every sink behind it. Failures, panics included, are logged and isolated;
/// they never stop dispatch or affect other sinks.
#[async_trait]
pub trait EventSink: Send + Sync {
	fn name(&self) -> &'static str;

	async fn handle(&self, event: &WatchEvent) -> Result<(), anyhow::Error>;
}

#[derive(Debug, Default)]
struct State {
	queue: VecDeque<WatchEvent>,
	closed: bool,
	dropped_debug_events: u64,
}

#[derive(Debug)]
struct Shared {
	state: std::sync::Mutex<State>,
	event_available: Notify,
	capacity: usize,
}

/// Fans events out to every registered sink, in registration order, from a
/// single dispatch task fed by a bounded queue.
///
/// When the queue is full, the oldest debug-only event is dropped to make
/// room; events the host acts on are never discarded.
pub struct EventRouter {
	shared: Arc<Shared>,
	handle: Mutex<Option<JoinHandle<()>>>,
}

impl EventRouter {
	pub fn new(sinks: Vec<Box<dyn EventSink>>) -> Self {
		Self::with_capacity(sinks, DEFAULT_QUEUE_CAPACITY)
	}

	pub fn with_capacity(sinks: Vec<Box<dyn EventSink>>, capacity: usize) -> Self {
		let shared = Arc::new(Shared {
			state: std::sync::Mutex::new(State::default()),
			event_available: Notify::new(),
			capacity,
		});

		let handle = spawn(Self::run_dispatch(Arc::clone(&shared), sinks));

		Self {
			shared,
			handle: Mutex::new(Some(handle)),
		}
	}

	/// Enqueues `event` for delivery to every sink.
	///
	/// Events published after [`Self::shutdown`] are silently discarded.
	pub fn publish(&self, event: WatchEvent) {
		{
			let mut state = self
				.shared
				.state
				.lock()
				.unwrap_or_else(|poisoned| poisoned.into_inner());

			if state.closed {
				trace!(?event, "Discarding event published after router shutdown;");
				return;
			}

			if state.queue.len() >= self.shared.capacity {
				if let Some(idx) = state.queue.iter().position(WatchEvent::is_debug_only) {
					state.queue.remove(idx);
					state.dropped_debug_events += 1;
				} else if event.is_debug_only() {
					state.dropped_debug_events += 1;
					trace!(?event, "Dropping debug event, router queue is full;");
					return;
				}
				// Otherwise the queue grows past capacity rather than losing
				// an event the host acts on.
			}

			state.queue.push_back(event);
		}

		self.shared.event_available.notify_one();
	}

	/// Stops accepting events and waits for the queue to drain.
	///
	/// Dispatch of already-queued events is given [`SHUTDOWN_DRAIN_TIMEOUT`]
	/// to finish before the dispatch task is aborted.
	pub async fn shutdown(&self) {
		{
			let mut state = self
				.shared
				.state
				.lock()
				.unwrap_or_else(|poisoned| poisoned.into_inner());
			state.closed = true;
		}
		self.shared.event_available.notify_one();

		let Some(mut handle) = self.handle.lock().await.take() else {
			return;
		};

		match timeout(SHUTDOWN_DRAIN_TIMEOUT, &mut handle).await {
			Ok(Ok(())) => debug!("Event router gracefully shutdown"),
			Ok(Err(e)) => error!(?e, "Failed to join event router dispatch task;"),
			Err(_) => {
				error!("Event router failed to drain in time, aborting dispatch task;");
				handle.abort();
			}
		}
	}

	async fn run_dispatch(shared: Arc<Shared>, sinks: Vec<Box<dyn EventSink>>) {
		loop {
			let maybe_event = {
				let mut state = shared
					.state
					.lock()
					.unwrap_or_else(|poisoned| poisoned.into_inner());

				match state.queue.pop_front() {
					Some(event) => Some(event),
					None if state.closed => {
						if state.dropped_debug_events > 0 {
							debug!(
								count = state.dropped_debug_events,
								"Dropped debug events due to a full router queue;"
							);
						}
						break;
					}
					None => None,
				}
			};

			if let Some(event) = maybe_event {
				for sink in &sinks {
					match AssertUnwindSafe(sink.handle(&event)).catch_unwind().await {
						Ok(Ok(())) => {}
						Ok(Err(e)) => {
							error!(sink = sink.name(), ?e, "Sink failed to handle event;");
						}
						Err(_) => {
							error!(sink = sink.name(), "Sink panicked while handling event;");
						}
					}
				}
			} else {
				shared.event_available.notified().await;
			}
		}
	}
}

/// Reports every event to the tracing subscriber, mirroring the messages an
/// operator following the log file expects.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
	fn name(&self) -> &'static str {
		"log"
	}

	async fn handle(&self, event: &WatchEvent) -> Result<(), anyhow::Error> {
		match event {
			WatchEvent::FileReady { path, .. } => {
				info!("New file is stable and ready: {}", path.display());
			}
			WatchEvent::DirectoryAdded { path, .. } => {
				info!("New directory detected: {}", path.display());
			}
			WatchEvent::ScanComplete => {
				info!("Initial scan complete. Watcher is now ready for new changes.");
			}
			WatchEvent::WatchError { root, message } => {
				error!(root, "Watcher error: {message}");
			}
			WatchEvent::Raw(raw) => {
				debug!("Event '{}' detected on: {}", raw.kind, raw.path.display());
			}
		}

		Ok(())
	}
}
