//! Sysfs-backed device resolution.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::device::{Device, DeviceResolver};
use crate::error::{DeviceError, Result};
use crate::id::DeviceId;

/// Resolves device ids against a sysfs tree.
///
/// Roots are configurable so tests can point at a fabricated tree instead of
/// the running kernel's `/sys` and `/dev`.
#[derive(Debug, Clone)]
pub struct SysfsResolver {
    sysfs_root: PathBuf,
    dev_root: PathBuf,
}

impl Default for SysfsResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SysfsResolver {
    /// Resolver over the running system (`/sys`, `/dev`).
    pub fn new() -> Self {
        Self::with_roots("/sys", "/dev")
    }

    /// Resolver over alternate roots, used by tests.
    pub fn with_roots(sysfs_root: impl Into<PathBuf>, dev_root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: sysfs_root.into(),
            dev_root: dev_root.into(),
        }
    }

    fn syspath_for(&self, id: &str, parsed: &DeviceId) -> Result<PathBuf> {
        let not_found = || DeviceError::NotFound { id: id.to_string() };

        let path = match parsed {
            DeviceId::Block { major, minor } => self
                .sysfs_root
                .join("dev/block")
                .join(format!("{}:{}", major, minor)),
            DeviceId::Char { major, minor } => self
                .sysfs_root
                .join("dev/char")
                .join(format!("{}:{}", major, minor)),
            DeviceId::Net { ifindex } => return self.syspath_for_ifindex(*ifindex).ok_or_else(not_found),
            DeviceId::Named { subsystem, sysname } => {
                let class = self.sysfs_root.join("class").join(subsystem).join(sysname);
                if class.exists() {
                    return Ok(class);
                }
                let bus = self
                    .sysfs_root
                    .join("bus")
                    .join(subsystem)
                    .join("devices")
                    .join(sysname);
                if bus.exists() {
                    return Ok(bus);
                }
                return Err(not_found());
            }
        };

        if path.exists() {
            Ok(path)
        } else {
            Err(not_found())
        }
    }

    fn syspath_for_ifindex(&self, ifindex: u32) -> Option<PathBuf> {
        let net = self.sysfs_root.join("class/net");
        let entries = fs::read_dir(&net).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(text) = fs::read_to_string(path.join("ifindex")) else {
                continue;
            };
            if text.trim().parse() == Ok(ifindex) {
                return Some(path);
            }
        }
        None
    }

    /// Reads `DEVNAME=` out of the device's uevent file, if present.
    fn devnode_from_uevent(&self, syspath: &Path) -> Result<Option<PathBuf>> {
        let uevent = match fs::read_to_string(syspath.join("uevent")) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        for line in uevent.lines() {
            if let Some(name) = line.strip_prefix("DEVNAME=") {
                return Ok(Some(self.dev_root.join(name)));
            }
        }
        Ok(None)
    }
}

impl DeviceResolver for SysfsResolver {
    fn resolve(&self, id: &str) -> Result<Device> {
        let parsed: DeviceId = id.parse()?;
        let syspath = self.syspath_for(id, &parsed)?;
        let devnode = self.devnode_from_uevent(&syspath)?;

        tracing::debug!(
            "Resolved device id '{}' to syspath '{}'",
            id,
            syspath.display()
        );

        Ok(Device::new(parsed, devnode))
    }
}
