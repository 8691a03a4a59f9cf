use crate::event::WatchedRoot;

use std::path::Path;

/// Maps event paths back to the watched root that owns them.
///
/// Roots are checked deepest-first so nested roots win over their ancestors,
/// and matching is done on whole path components; `/data/foo` never claims
/// `/data/foobar/report.dat`.
#[derive(Debug, Clone)]
pub struct RootResolver {
	roots: Vec<WatchedRoot>,
}

impl RootResolver {
	pub fn new(mut roots: Vec<WatchedRoot>) -> Self {
		roots.sort_by_key(|root| std::cmp::Reverse(root.path.components().count()));

		Self { roots }
	}

	/// The deepest root containing `path`, if any.
	pub fn resolve(&self, path: &Path) -> Option<&WatchedRoot> {
		self.roots.iter().find(|root| path.starts_with(&root.path))
	}

	pub fn roots(&self) -> &[WatchedRoot] {
		&self.roots
	}
}
