//! The device handle and the resolver seam.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::id::DeviceId;

/// A handle to one kernel device.
///
/// Carries the stable id, the device node path (absent for devices without a
/// node, e.g. network interfaces), and the cached inotify watch descriptor.
/// The watch subsystem is the only writer of the cached descriptor; every
/// other attribute is read-only after construction.
#[derive(Debug, Clone)]
pub struct Device {
    id: DeviceId,
    devnode: Option<PathBuf>,
    watch_descriptor: Option<i32>,
}

impl Device {
    /// Creates a device handle with no cached watch descriptor.
    pub fn new(id: DeviceId, devnode: Option<PathBuf>) -> Self {
        Self {
            id,
            devnode,
            watch_descriptor: None,
        }
    }

    /// The parsed stable id.
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// The stable id in its textual, persistable form.
    pub fn device_id(&self) -> String {
        self.id.to_string()
    }

    /// The device node path, if this device has one.
    pub fn devnode(&self) -> Option<&Path> {
        self.devnode.as_deref()
    }

    /// The cached inotify watch descriptor, if a watch is active.
    pub fn watch_descriptor(&self) -> Option<i32> {
        self.watch_descriptor
    }

    /// Replaces the cached watch descriptor.
    pub fn set_watch_descriptor(&mut self, wd: Option<i32>) {
        self.watch_descriptor = wd;
    }
}

/// Resolves a stable id text back into a live device handle.
///
/// Production code uses [`crate::sysfs::SysfsResolver`]; tests substitute a
/// fake so resolution does not touch the real system.
pub trait DeviceResolver {
    /// Resolves `id` to a device, or fails with `MalformedId`/`NotFound`.
    fn resolve(&self, id: &str) -> Result<Device>;
}
