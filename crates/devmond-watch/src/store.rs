//! On-disk persistence of the watch descriptor -> device id mapping.
//!
//! The store is a directory of symbolic links: entry name is the watch
//! descriptor in decimal, link target is the stable device id. One entry
//! exists per live watch. The mechanism is hidden behind [`WatchStore`] so
//! the lifecycle manager never learns it is symlinks.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::{symlink, DirBuilderExt};
use std::path::PathBuf;

use tracing::warn;

use crate::error::{Result, WatchError};

/// Default live store root on a running system.
pub const DEFAULT_ROOT: &str = "/run/devmond/watch";

/// Persistent watch-descriptor -> device-id mapping.
pub trait WatchStore {
    /// Records `device_id` under descriptor `wd`, replacing any stale entry.
    fn put(&self, wd: i32, device_id: &str) -> Result<()>;

    /// Looks up the device id recorded under `wd`. A missing entry is
    /// `Ok(None)`, not an error.
    fn get(&self, wd: i32) -> Result<Option<String>>;

    /// Drops the entry for `wd`. Succeeds if the entry is already gone.
    fn remove(&self, wd: i32) -> Result<()>;

    /// Detaches whatever the previous process instance persisted and returns
    /// the recorded device ids, consuming the old state. Returns an empty
    /// list when there is nothing to recover.
    fn drain_previous(&self) -> Result<Vec<String>>;
}

/// Production store: a directory of symlinks under a fixed root.
#[derive(Debug, Clone)]
pub struct SymlinkStore {
    root: PathBuf,
}

impl Default for SymlinkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SymlinkStore {
    /// Store rooted at [`DEFAULT_ROOT`].
    pub fn new() -> Self {
        Self::with_root(DEFAULT_ROOT)
    }

    /// Store rooted at an alternate path, used by tests.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Entry path for a descriptor: `<root>/<wd>` in plain decimal.
    fn entry_path(&self, wd: i32) -> PathBuf {
        self.root.join(wd.to_string())
    }

    /// Sibling path the live root is renamed to during recovery.
    fn staging_path(&self) -> PathBuf {
        let mut name = self.root.as_os_str().to_os_string();
        name.push(".old");
        PathBuf::from(name)
    }
}

impl WatchStore for SymlinkStore {
    fn put(&self, wd: i32, device_id: &str) -> Result<()> {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(&self.root)?;

        // A crashed predecessor may have left an entry under a descriptor
        // the kernel has since reused.
        let path = self.entry_path(wd);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        symlink(device_id, &path)?;
        Ok(())
    }

    fn get(&self, wd: i32) -> Result<Option<String>> {
        let target = match fs::read_link(self.entry_path(wd)) {
            Ok(target) => target,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match target.into_os_string().into_string() {
            Ok(id) => Ok(Some(id)),
            Err(_) => Err(WatchError::MalformedEntry { wd }),
        }
    }

    fn remove(&self, wd: i32) -> Result<()> {
        match fs::remove_file(self.entry_path(wd)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn drain_previous(&self) -> Result<Vec<String>> {
        let old = self.staging_path();
        match fs::rename(&self.root, &old) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        }

        let entries = fs::read_dir(&old)?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to enumerate old watch store: {}", e);
                    continue;
                }
            };
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }

            let path = entry.path();
            match fs::read_link(&path) {
                Ok(target) => match target.into_os_string().into_string() {
                    Ok(id) => ids.push(id),
                    Err(_) => {
                        warn!(
                            "Old watch entry '{}' has a malformed target, ignoring",
                            path.display()
                        );
                    }
                },
                Err(e) => {
                    warn!("Failed to read old watch entry '{}', ignoring: {}", path.display(), e);
                }
            }

            // Entries are consumed whether or not they were usable, so the
            // old root can be pruned below.
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to unlink old watch entry '{}': {}", path.display(), e);
            }
        }

        if let Err(e) = fs::remove_dir(&old) {
            warn!("Failed to remove old watch store '{}': {}", old.display(), e);
        }

        Ok(ids)
    }
}
