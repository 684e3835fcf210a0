//! Stable textual device ids.
//!
//! The id text is the only device attribute other subsystems are allowed to
//! persist. Four forms exist:
//!
//! - `b<major>:<minor>` — block device
//! - `c<major>:<minor>` — character device
//! - `n<ifindex>` — network interface
//! - `+<subsystem>:<sysname>` — any other kernel device
//!
//! The text never contains a path separator, so it is safe to embed in file
//! names and symlink targets.

use std::fmt;
use std::str::FromStr;

use crate::error::{DeviceError, Result};

/// A parsed stable device id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceId {
    /// Block device, identified by device number.
    Block {
        /// Major device number.
        major: u32,
        /// Minor device number.
        minor: u32,
    },
    /// Character device, identified by device number.
    Char {
        /// Major device number.
        major: u32,
        /// Minor device number.
        minor: u32,
    },
    /// Network interface, identified by kernel ifindex.
    Net {
        /// Kernel interface index.
        ifindex: u32,
    },
    /// Any other device, identified by subsystem and sysfs name.
    Named {
        /// Kernel subsystem, e.g. `leds`.
        subsystem: String,
        /// Name of the device directory within the subsystem.
        sysname: String,
    },
}

impl DeviceId {
    /// Parses an id from its textual form.
    pub fn parse(id: &str) -> Result<Self> {
        id.parse()
    }

    fn parse_devnum(id: &str, body: &str) -> Result<(u32, u32)> {
        let malformed = || DeviceError::MalformedId { id: id.to_string() };
        let (major, minor) = body.split_once(':').ok_or_else(malformed)?;
        let major = major.parse().map_err(|_| malformed())?;
        let minor = minor.parse().map_err(|_| malformed())?;
        Ok((major, minor))
    }
}

impl FromStr for DeviceId {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || DeviceError::MalformedId { id: s.to_string() };

        if s.contains('/') {
            return Err(malformed());
        }

        if let Some(body) = s.strip_prefix('b') {
            let (major, minor) = Self::parse_devnum(s, body)?;
            Ok(DeviceId::Block { major, minor })
        } else if let Some(body) = s.strip_prefix('c') {
            let (major, minor) = Self::parse_devnum(s, body)?;
            Ok(DeviceId::Char { major, minor })
        } else if let Some(body) = s.strip_prefix('n') {
            let ifindex = body.parse().map_err(|_| malformed())?;
            Ok(DeviceId::Net { ifindex })
        } else if let Some(body) = s.strip_prefix('+') {
            let (subsystem, sysname) = body.split_once(':').ok_or_else(malformed)?;
            if subsystem.is_empty() || sysname.is_empty() {
                return Err(malformed());
            }
            Ok(DeviceId::Named {
                subsystem: subsystem.to_string(),
                sysname: sysname.to_string(),
            })
        } else {
            Err(malformed())
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceId::Block { major, minor } => write!(f, "b{}:{}", major, minor),
            DeviceId::Char { major, minor } => write!(f, "c{}:{}", major, minor),
            DeviceId::Net { ifindex } => write!(f, "n{}", ifindex),
            DeviceId::Named { subsystem, sysname } => write!(f, "+{}:{}", subsystem, sysname),
        }
    }
}
