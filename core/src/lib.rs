//! The watch-and-stabilize engine.
//!
//! Raw filesystem notifications come in from one watch source per configured
//! root, the [`tracker::StabilityTracker`] decides when a new file has
//! stopped changing, and the resulting semantic events ([`WatchEvent`]) are
//! fanned out to sinks through the [`EventRouter`].

pub mod config;
pub mod error;
pub mod event;
pub mod resolver;
pub mod router;
pub mod tracker;
pub mod watcher;

pub use config::{WatchConfig, WatcherMode};
pub use error::{ConfigError, EngineError};
pub use event::{RawEvent, RawEventKind, RootId, WatchEvent, WatchedRoot};
pub use resolver::RootResolver;
pub use router::{EventRouter, EventSink, LogSink};
pub use tracker::StabilityTracker;
pub use watcher::WatchEngine;
