use std::{fmt, io, path::Path};

use thiserror::Error;

/// I/O error carrying the path that caused it, so log lines and error chains
/// always say which file or directory was involved.
#[derive(Error, Debug)]
pub struct FileIOError {
	pub path: Box<Path>,
	#[source]
	pub source: io::Error,
	pub maybe_context: Option<&'static str>,
}

impl fmt::Display for FileIOError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{}: {}; path: '{}'",
			self.maybe_context.unwrap_or("file I/O error"),
			self.source,
			self.path.display()
		)
	}
}

impl<P: AsRef<Path>> From<(P, io::Error)> for FileIOError {
	fn from((path, source): (P, io::Error)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: None,
		}
	}
}

impl<P: AsRef<Path>> From<(P, io::Error, &'static str)> for FileIOError {
	fn from((path, source, context): (P, io::Error, &'static str)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: Some(context),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_includes_path_and_context() {
		let e = FileIOError::from((
			"/data/inbound",
			io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
			"Failed to read watch folder",
		));

		let rendered = e.to_string();
		assert!(rendered.starts_with("Failed to read watch folder"));
		assert!(rendered.contains("/data/inbound"));
	}

	#[test]
	fn display_without_context_uses_generic_prefix() {
		let e = FileIOError::from((
			"/tmp/x",
			io::Error::new(io::ErrorKind::NotFound, "gone"),
		));

		assert!(e.to_string().starts_with("file I/O error"));
	}
}
