#![warn(missing_docs)]

//! devmond watch subsystem.
//!
//! Tracks one inotify close-after-write watch per monitored device and makes
//! that watch's existence durable across daemon restarts. Kernel watch
//! descriptors are only meaningful while the owning inotify descriptor stays
//! open, so every active watch is mirrored into an on-disk store mapping
//! watch descriptor to stable device id. After a restart the recovery
//! procedure replays the old store, re-registering each surviving device
//! under a fresh descriptor.
//!
//! Startup sequencing is the caller's contract: construct the [`Inotify`]
//! handle once, run [`WatchManager::restore`] once, and only then allow
//! concurrent `begin`/`end` activity.

pub mod error;
pub mod inotify;
pub mod manager;
pub mod store;

pub use error::{Result, WatchError};
pub use inotify::{Inotify, NotifyBackend};
pub use manager::WatchManager;
pub use store::{SymlinkStore, WatchStore};
