use crate::config::NotificationSettings;

use dropwatch_core::{EventSink, WatchEvent};

use std::{path::Path, process::Stdio};

use async_trait::async_trait;
use notify_rust::Notification;
use tokio::process::Command;
use tracing::warn;

/// Raises a desktop notification for events the user acts on, with an
/// optional sound. Popups and sounds are best-effort; failures are logged by
/// the router and never reach the engine.
pub struct NotificationSink {
	settings: NotificationSettings,
	extension_label: String,
}

impl NotificationSink {
	pub fn new(settings: NotificationSettings, extension: &str) -> Self {
		Self {
			settings,
			extension_label: extension.trim_start_matches('.').to_uppercase(),
		}
	}

	async fn notify(&self, summary: String, body: String) -> Result<(), anyhow::Error> {
		let icon = self.settings.icon_path.clone();

		// show() blocks on the desktop bus round-trip
		tokio::task::spawn_blocking(move || {
			let mut notification = Notification::new();
			notification.summary(&summary).body(&body);

			if let Some(icon) = icon {
				notification.icon(&icon.to_string_lossy());
			}

			notification.show().map(|_| ())
		})
		.await??;

		Ok(())
	}

	/// Fire and forget; a missing or broken player must not fail the sink.
	async fn play_sound(&self) {
		let Some(sound_path) = &self.settings.sound_path else {
			return;
		};

		let player = self
			.settings
			.player
			.clone()
			.unwrap_or_else(|| default_player().to_string());

		match Command::new(&player)
			.arg(sound_path)
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.spawn()
		{
			Ok(mut child) => {
				tokio::spawn(async move {
					if let Err(e) = child.wait().await {
						warn!(?e, "Failed to wait for the notification sound player;");
					}
				});
			}
			Err(e) => warn!(?e, player, "Failed to spawn the notification sound player;"),
		}
	}
}

fn default_player() -> &'static str {
	if cfg!(target_os = "macos") {
		"afplay"
	} else {
		"paplay"
	}
}

#[async_trait]
impl EventSink for NotificationSink {
	fn name(&self) -> &'static str {
		"notification"
	}

	async fn handle(&self, event: &WatchEvent) -> Result<(), anyhow::Error> {
		match event {
			WatchEvent::FileReady { path, root } => {
				let folder_name = root
					.as_ref()
					.map(|root| root.path.as_path())
					.or_else(|| path.parent())
					.and_then(Path::file_name)
					.map(|name| name.to_string_lossy().into_owned())
					.unwrap_or_else(|| "watched folder".to_string());

				let relative = root
					.as_ref()
					.map(|root| root.relative_of(path))
					.unwrap_or(path);

				let result = self
					.notify(
						format!("New {} file ready on {folder_name}!", self.extension_label),
						format!("File: {}", relative.display()),
					)
					.await;

				self.play_sound().await;

				result
			}

			WatchEvent::DirectoryAdded { path, root } => {
				let relative = root
					.as_ref()
					.map(|root| root.relative_of(path))
					.unwrap_or(path);

				self.notify(
					"New folder created".to_string(),
					format!("Path: {}", relative.display()),
				)
				.await
			}

			WatchEvent::WatchError { message, .. } => {
				self.notify("Watcher error".to_string(), message.clone()).await
			}

			WatchEvent::ScanComplete | WatchEvent::Raw(_) => Ok(()),
		}
	}
}
