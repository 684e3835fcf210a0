//! Error type for the watch subsystem.

use std::path::PathBuf;

use devmond_device::DeviceError;
use thiserror::Error;

/// Errors surfaced by watch lifecycle and persistence operations.
///
/// Best-effort cleanup failures never reach this type; they are logged and
/// swallowed at the call site. Everything here is a hard failure of the
/// operation it came from.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Caller passed a negative watch descriptor. Kernel-assigned
    /// descriptors are always non-negative, so this is a caller bug.
    #[error("Invalid watch descriptor: {wd}")]
    InvalidDescriptor {
        /// The offending descriptor.
        wd: i32,
    },

    /// The device has no device node, so there is nothing to watch.
    #[error("Device {id} has no device node")]
    NoDevnode {
        /// Stable id of the device.
        id: String,
    },

    /// The kernel refused to add the watch.
    #[error("Failed to add watch on {devnode}: {source}")]
    AddWatch {
        /// Node the watch was attempted on.
        devnode: PathBuf,
        /// Errno from the kernel.
        source: std::io::Error,
    },

    /// A persisted store entry could not be decoded as a device id.
    #[error("Store entry for watch descriptor {wd} is not valid UTF-8")]
    MalformedEntry {
        /// Descriptor whose entry is malformed.
        wd: i32,
    },

    /// Resolving a persisted device id failed.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// An underlying filesystem or inotify operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the watch crate.
pub type Result<T> = std::result::Result<T, WatchError>;
