#![warn(missing_docs)]

//! devmond device identity subsystem.
//!
//! Provides the stable textual device id scheme, the [`Device`] handle, and
//! resolution of an id back to a live device through sysfs. A device id
//! survives daemon restarts; kernel-assigned handles (such as inotify watch
//! descriptors) do not, which is why every subsystem that persists per-device
//! state keys it by device id rather than by any kernel handle.

pub mod device;
pub mod error;
pub mod id;
pub mod sysfs;

pub use device::{Device, DeviceResolver};
pub use error::{DeviceError, Result};
pub use id::DeviceId;
pub use sysfs::SysfsResolver;
