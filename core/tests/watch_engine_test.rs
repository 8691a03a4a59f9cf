use dropwatch_core::{
	EventRouter, EventSink, WatchConfig, WatchEngine, WatchEvent, WatcherMode,
};

use std::{
	path::PathBuf,
	sync::{Arc, Mutex},
	time::Duration,
};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::time::{sleep, Instant};

/// Records every delivered event with its arrival instant.
#[derive(Clone, Default)]
struct EventCollector {
	events: Arc<Mutex<Vec<(Instant, WatchEvent)>>>,
}

impl EventCollector {
	fn snapshot(&self) -> Vec<(Instant, WatchEvent)> {
		self.events.lock().unwrap().clone()
	}

	async fn expect(
		&self,
		what: &str,
		timeout: Duration,
		predicate: impl Fn(&WatchEvent) -> bool,
	) -> (Instant, WatchEvent) {
		let deadline = Instant::now() + timeout;

		loop {
			if let Some(found) = self
				.events
				.lock()
				.unwrap()
				.iter()
				.find(|(_, event)| predicate(event))
				.cloned()
			{
				return found;
			}

			if Instant::now() > deadline {
				panic!("timed out waiting for {what}; got {:#?}", self.snapshot());
			}

			sleep(Duration::from_millis(50)).await;
		}
	}
}

#[async_trait]
impl EventSink for EventCollector {
	fn name(&self) -> &'static str {
		"collector"
	}

	async fn handle(&self, event: &WatchEvent) -> Result<(), anyhow::Error> {
		self.events
			.lock()
			.unwrap()
			.push((Instant::now(), event.clone()));

		Ok(())
	}
}

fn is_scan_complete(event: &WatchEvent) -> bool {
	matches!(event, WatchEvent::ScanComplete)
}

fn is_file_ready_for(name: &'static str) -> impl Fn(&WatchEvent) -> bool {
	move |event| matches!(event, WatchEvent::FileReady { path, .. } if path.ends_with(name))
}

fn test_config(roots: Vec<PathBuf>, mode: WatcherMode) -> WatchConfig {
	WatchConfig {
		mode,
		scan_interval_ms: 300,
		stability_window_ms: 600,
		poll_interval_ms: 200,
		..WatchConfig::new(roots, ".dat")
	}
}

async fn start_engine(config: WatchConfig) -> (WatchEngine, Arc<EventRouter>, EventCollector) {
	config.validate().expect("test configuration must be valid");

	let collector = EventCollector::default();
	let router = Arc::new(EventRouter::new(vec![Box::new(collector.clone())]));
	let engine = WatchEngine::start(config, Arc::clone(&router))
		.await
		.expect("failed to start watch engine");

	(engine, router, collector)
}

/// The full happy path: a file grows in bursts, stops changing, and gets
/// reported exactly once, one stability window after its last change. Files
/// with the wrong extension, hidden files and files that existed before
/// startup are never reported.
async fn file_ready_story(mode: WatcherMode) {
	let dir = tempfile::tempdir().unwrap();
	let root = dir.path().canonicalize().unwrap();

	tokio::fs::write(root.join("existing.dat"), b"already here")
		.await
		.unwrap();

	let (engine, router, collector) = start_engine(test_config(vec![root.clone()], mode)).await;

	collector
		.expect(
			"initial scan completion",
			Duration::from_secs(5),
			is_scan_complete,
		)
		.await;

	tokio::fs::write(root.join("b.tmp"), b"wrong extension")
		.await
		.unwrap();
	tokio::fs::write(root.join(".partial.dat"), b"hidden")
		.await
		.unwrap();

	// Grow the file in bursts, then leave it alone
	let target = root.join("a.dat");
	tokio::fs::write(&target, vec![0u8; 10_000]).await.unwrap();
	sleep(Duration::from_millis(150)).await;
	tokio::fs::write(&target, vec![0u8; 50_000]).await.unwrap();
	sleep(Duration::from_millis(150)).await;
	let before_last_write = Instant::now();
	tokio::fs::write(&target, vec![0u8; 120_000]).await.unwrap();

	let (received_at, event) = collector
		.expect(
			"stable file report",
			Duration::from_secs(10),
			is_file_ready_for("a.dat"),
		)
		.await;

	assert!(
		received_at.saturating_duration_since(before_last_write) >= Duration::from_millis(600),
		"file was reported before a full stability window elapsed"
	);
	if let WatchEvent::FileReady { root: owner, .. } = &event {
		assert_eq!(
			owner.as_ref().map(|owner| owner.path.as_path()),
			Some(root.as_path())
		);
	}

	// Give the engine room to misbehave before counting
	sleep(Duration::from_millis(1500)).await;

	engine.shutdown().await;
	router.shutdown().await;

	let events = collector.snapshot();

	let file_ready_count = events
		.iter()
		.filter(|(_, event)| matches!(event, WatchEvent::FileReady { .. }))
		.count();
	assert_eq!(
		file_ready_count, 1,
		"expected exactly one ready report: {events:#?}"
	);

	let scan_complete_count = events
		.iter()
		.filter(|(_, event)| is_scan_complete(event))
		.count();
	assert_eq!(
		scan_complete_count, 1,
		"expected exactly one scan completion: {events:#?}"
	);

	assert!(
		!events.iter().any(|(_, event)| matches!(
			event,
			WatchEvent::WatchError { .. } | WatchEvent::DirectoryAdded { .. } | WatchEvent::Raw(_)
		)),
		"unexpected events: {events:#?}"
	);

	let scan_idx = events
		.iter()
		.position(|(_, event)| is_scan_complete(event))
		.unwrap();
	let ready_idx = events
		.iter()
		.position(|(_, event)| matches!(event, WatchEvent::FileReady { .. }))
		.unwrap();
	assert!(
		scan_idx < ready_idx,
		"scan completion must precede ready reports"
	);
}

#[tokio::test(flavor = "multi_thread")]
async fn native_mode_reports_a_stable_file_exactly_once() {
	file_ready_story(WatcherMode::Native).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn polling_mode_reports_a_stable_file_exactly_once() {
	file_ready_story(WatcherMode::Polling).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn directories_are_reported_immediately() {
	let dir = tempfile::tempdir().unwrap();
	let root = dir.path().canonicalize().unwrap();

	let mut config = test_config(vec![root.clone()], WatcherMode::Native);
	config.stability_window_ms = 2500;
	config.poll_interval_ms = 250;

	let (engine, router, collector) = start_engine(config).await;
	collector
		.expect(
			"initial scan completion",
			Duration::from_secs(5),
			is_scan_complete,
		)
		.await;

	let created_at = Instant::now();
	tokio::fs::create_dir(root.join("incoming")).await.unwrap();

	let (received_at, _) = collector
		.expect("new directory report", Duration::from_secs(5), |event| {
			matches!(event, WatchEvent::DirectoryAdded { path, .. } if path.ends_with("incoming"))
		})
		.await;

	assert!(
		received_at.saturating_duration_since(created_at) < Duration::from_millis(2500),
		"directory report must not wait for a stability window"
	);

	// Files inside the new directory are tracked like any other
	tokio::fs::write(root.join("incoming").join("inner.dat"), b"payload")
		.await
		.unwrap();
	collector
		.expect(
			"nested file report",
			Duration::from_secs(10),
			is_file_ready_for("inner.dat"),
		)
		.await;

	engine.shutdown().await;
	router.shutdown().await;

	let directory_count = collector
		.snapshot()
		.iter()
		.filter(|(_, event)| matches!(event, WatchEvent::DirectoryAdded { .. }))
		.count();
	assert_eq!(
		directory_count, 1,
		"expected exactly one directory report"
	);
}

#[tokio::test(flavor = "multi_thread")]
async fn nested_roots_report_each_change_exactly_once() {
	let dir = tempfile::tempdir().unwrap();
	let outer = dir.path().canonicalize().unwrap();
	let inner = outer.join("inner");
	tokio::fs::create_dir(&inner).await.unwrap();

	let (engine, router, collector) = start_engine(test_config(
		vec![outer.clone(), inner.clone()],
		WatcherMode::Native,
	))
	.await;
	collector
		.expect(
			"initial scan completion",
			Duration::from_secs(5),
			is_scan_complete,
		)
		.await;

	// Both roots' backends see this mkdir; only the deepest may report it
	tokio::fs::create_dir(inner.join("newdir")).await.unwrap();
	collector
		.expect("new directory report", Duration::from_secs(5), |event| {
			matches!(event, WatchEvent::DirectoryAdded { path, .. } if path.ends_with("newdir"))
		})
		.await;

	tokio::fs::write(inner.join("clip.dat"), b"payload")
		.await
		.unwrap();
	let (_, event) = collector
		.expect(
			"ready report",
			Duration::from_secs(10),
			is_file_ready_for("clip.dat"),
		)
		.await;
	if let WatchEvent::FileReady { root: owner, .. } = &event {
		assert_eq!(
			owner.as_ref().map(|owner| owner.path.as_path()),
			Some(inner.as_path()),
			"the deepest root owns the file"
		);
	}

	// Give the ancestor root's duplicates time to surface before counting
	sleep(Duration::from_millis(1500)).await;

	engine.shutdown().await;
	router.shutdown().await;

	let events = collector.snapshot();
	assert_eq!(
		events
			.iter()
			.filter(|(_, event)| matches!(event, WatchEvent::DirectoryAdded { .. }))
			.count(),
		1,
		"exactly one directory report: {events:#?}"
	);
	assert_eq!(
		events
			.iter()
			.filter(|(_, event)| matches!(event, WatchEvent::FileReady { .. }))
			.count(),
		1,
		"exactly one ready report: {events:#?}"
	);
}

#[tokio::test(flavor = "multi_thread")]
async fn deletion_before_settling_stays_silent() {
	let dir = tempfile::tempdir().unwrap();
	let root = dir.path().canonicalize().unwrap();

	let (engine, router, collector) =
		start_engine(test_config(vec![root.clone()], WatcherMode::Native)).await;
	collector
		.expect(
			"initial scan completion",
			Duration::from_secs(5),
			is_scan_complete,
		)
		.await;

	let target = root.join("short_lived.dat");
	tokio::fs::write(&target, b"here and gone").await.unwrap();
	sleep(Duration::from_millis(250)).await;
	tokio::fs::remove_file(&target).await.unwrap();

	// Wait well past the point it would have settled
	sleep(Duration::from_millis(1600)).await;

	engine.shutdown().await;
	router.shutdown().await;

	assert!(
		!collector
			.snapshot()
			.iter()
			.any(|(_, event)| matches!(event, WatchEvent::FileReady { .. })),
		"deleted file must not be reported: {:#?}",
		collector.snapshot()
	);
}

#[tokio::test(flavor = "multi_thread")]
async fn unwatchable_root_degrades_without_stopping_the_others() {
	let dir = tempfile::tempdir().unwrap();
	let good = dir.path().canonicalize().unwrap();
	let missing = good.join("does_not_exist");

	let (engine, router, collector) =
		start_engine(test_config(vec![good.clone(), missing], WatcherMode::Native)).await;

	let (_, error_event) = collector
		.expect(
			"watcher degradation report",
			Duration::from_secs(5),
			|event| matches!(event, WatchEvent::WatchError { .. }),
		)
		.await;
	if let WatchEvent::WatchError { root, .. } = error_event {
		assert_eq!(root, 1, "the failing root is the second one configured");
	}

	collector
		.expect(
			"initial scan completion",
			Duration::from_secs(5),
			is_scan_complete,
		)
		.await;

	tokio::fs::write(good.join("still_works.dat"), b"payload")
		.await
		.unwrap();
	collector
		.expect(
			"ready report from the healthy root",
			Duration::from_secs(10),
			is_file_ready_for("still_works.dat"),
		)
		.await;

	engine.shutdown().await;
	router.shutdown().await;

	let error_count = collector
		.snapshot()
		.iter()
		.filter(|(_, event)| matches!(event, WatchEvent::WatchError { .. }))
		.count();
	assert_eq!(
		error_count, 1,
		"exactly one degradation report per failed root"
	);
}
