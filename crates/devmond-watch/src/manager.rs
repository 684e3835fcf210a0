//! Watch lifecycle: begin, end, lookup, and startup recovery.

use std::fmt::Display;

use devmond_device::{Device, DeviceResolver};
use tracing::{debug, warn};

use crate::error::{Result, WatchError};
use crate::inotify::NotifyBackend;
use crate::store::WatchStore;

/// Logs a best-effort step's failure and moves on. Cleanup failures must not
/// block unrelated work or abort startup.
fn best_effort<T, E: Display>(res: std::result::Result<T, E>, context: impl Display) {
    if let Err(e) = res {
        warn!("{}, ignoring: {}", context, e);
    }
}

/// Owns the three collaborators of the watch subsystem: the kernel
/// notification backend, the persistent store, and the device resolver.
///
/// One manager exists per daemon. Worker processes forked from the daemon
/// inherit the backend's descriptor, so watch descriptors allocated anywhere
/// in the process tree share one kernel watch table and never collide on a
/// store entry.
pub struct WatchManager<B, S, R> {
    notify: B,
    store: S,
    resolver: R,
}

impl<B, S, R> WatchManager<B, S, R>
where
    B: NotifyBackend,
    S: WatchStore,
    R: DeviceResolver,
{
    /// Assembles a manager from its collaborators.
    pub fn new(notify: B, store: S, resolver: R) -> Self {
        Self {
            notify,
            store,
            resolver,
        }
    }

    /// The notification backend, exposed so the event loop can poll it.
    pub fn notify(&self) -> &B {
        &self.notify
    }

    /// Starts watching a device for close-after-write and persists the
    /// mapping. On failure the device is simply left unwatched; callers do
    /// not retry.
    pub fn begin(&self, dev: &mut Device) -> Result<()> {
        let id = dev.device_id();
        let devnode = dev
            .devnode()
            .ok_or_else(|| WatchError::NoDevnode { id: id.clone() })?
            .to_path_buf();

        debug!("Adding watch on '{}'", devnode.display());
        let wd = self
            .notify
            .add_watch(&devnode)
            .map_err(|source| WatchError::AddWatch { devnode, source })?;

        // An already-watched device gets its descriptor overwritten here
        // without tearing the previous watch down; callers end() first when
        // replacing a watch.
        dev.set_watch_descriptor(Some(wd));

        self.store.put(wd, &id)?;
        Ok(())
    }

    /// Stops watching a device. Safe to call on devices that were never
    /// watched. The kernel watch and the store entry may already be gone
    /// (node deleted, racing cleanup); both removals are best-effort. The
    /// cached descriptor is cleared unconditionally.
    pub fn end(&self, dev: &mut Device) -> Result<()> {
        let wd = match dev.watch_descriptor() {
            Some(wd) => wd,
            None => return Ok(()),
        };

        let id = dev.device_id();
        debug!("Removing watch on '{}'", id);
        best_effort(
            self.notify.remove_watch(wd),
            format!("Failed to remove watch {} for '{}'", wd, id),
        );
        best_effort(
            self.store.remove(wd),
            format!("Failed to drop store entry {} for '{}'", wd, id),
        );

        dev.set_watch_descriptor(None);
        Ok(())
    }

    /// Maps an event's watch descriptor back to its device. A descriptor
    /// with no store entry yields `Ok(None)`: the watch may have been ended
    /// concurrently and the event raced the cleanup. A present entry whose
    /// device no longer resolves is a hard error.
    pub fn lookup(&self, wd: i32) -> Result<Option<Device>> {
        if wd < 0 {
            return Err(WatchError::InvalidDescriptor { wd });
        }

        let id = match self.store.get(wd)? {
            Some(id) => id,
            None => return Ok(None),
        };

        let dev = self.resolver.resolve(&id)?;
        Ok(Some(dev))
    }

    /// Re-establishes the watches a previous process instance persisted.
    ///
    /// Runs once at startup, before any concurrent begin/end activity. Every
    /// recovered device receives a fresh descriptor; the old numeric
    /// identity is discarded with the old store. Devices that vanished since
    /// the last run, or that fail to re-register, are dropped from the watch
    /// set with a warning. Only store-level failures (the old state can not
    /// be detached or read at all) abort the procedure; callers log those
    /// and continue starting up with no watches restored.
    pub fn restore(&self) -> Result<()> {
        let ids = self.store.drain_previous()?;

        for id in ids {
            let mut dev = match self.resolver.resolve(&id) {
                Ok(dev) => dev,
                Err(e) => {
                    warn!(
                        "Cannot resolve persisted device '{}', dropping its old watch: {}",
                        id, e
                    );
                    continue;
                }
            };

            debug!("Restoring old watch on '{}'", id);
            if let Err(e) = self.begin(&mut dev) {
                warn!("Failed to restore watch for '{}': {}", id, e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SymlinkStore;
    use devmond_device::{DeviceError, DeviceId};
    use std::collections::HashMap;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakeNotify {
        next: AtomicI32,
        removed: Mutex<Vec<i32>>,
    }

    impl FakeNotify {
        fn new() -> Self {
            Self {
                next: AtomicI32::new(100),
                removed: Mutex::new(Vec::new()),
            }
        }

        fn removed(&self) -> Vec<i32> {
            self.removed.lock().unwrap().clone()
        }
    }

    impl NotifyBackend for FakeNotify {
        fn add_watch(&self, _devnode: &Path) -> io::Result<i32> {
            Ok(self.next.fetch_add(1, Ordering::SeqCst))
        }

        fn remove_watch(&self, wd: i32) -> io::Result<()> {
            self.removed.lock().unwrap().push(wd);
            Ok(())
        }
    }

    struct FakeResolver {
        devices: HashMap<String, Option<PathBuf>>,
    }

    impl FakeResolver {
        fn new(devices: &[(&str, Option<&str>)]) -> Self {
            Self {
                devices: devices
                    .iter()
                    .map(|(id, node)| (id.to_string(), node.map(PathBuf::from)))
                    .collect(),
            }
        }
    }

    impl DeviceResolver for FakeResolver {
        fn resolve(&self, id: &str) -> devmond_device::Result<Device> {
            let parsed: DeviceId = id.parse()?;
            match self.devices.get(id) {
                Some(node) => Ok(Device::new(parsed, node.clone())),
                None => Err(DeviceError::NotFound { id: id.to_string() }),
            }
        }
    }

    fn manager_in(
        tmp: &TempDir,
        devices: &[(&str, Option<&str>)],
    ) -> WatchManager<FakeNotify, SymlinkStore, FakeResolver> {
        WatchManager::new(
            FakeNotify::new(),
            SymlinkStore::with_root(tmp.path().join("watch")),
            FakeResolver::new(devices),
        )
    }

    fn device(id: &str, devnode: Option<&str>) -> Device {
        Device::new(id.parse().unwrap(), devnode.map(PathBuf::from))
    }

    #[test]
    fn test_begin_then_lookup_round_trip() {
        let tmp = TempDir::new().unwrap();
        let manager = manager_in(&tmp, &[("b8:1", Some("/dev/sda1"))]);

        let mut dev = device("b8:1", Some("/dev/sda1"));
        manager.begin(&mut dev).unwrap();

        let wd = dev.watch_descriptor().unwrap();
        let found = manager.lookup(wd).unwrap().unwrap();
        assert_eq!(found.device_id(), "b8:1");
    }

    #[test]
    fn test_begin_requires_devnode() {
        let tmp = TempDir::new().unwrap();
        let manager = manager_in(&tmp, &[]);

        let mut dev = device("n2", None);
        assert!(matches!(
            manager.begin(&mut dev),
            Err(WatchError::NoDevnode { .. })
        ));
        assert_eq!(dev.watch_descriptor(), None);
    }

    #[test]
    fn test_begin_twice_overwrites_descriptor() {
        // Double registration without an intervening end() leaks the first
        // watch and its store entry; only the new descriptor stays cached.
        let tmp = TempDir::new().unwrap();
        let manager = manager_in(&tmp, &[("b8:1", Some("/dev/sda1"))]);

        let mut dev = device("b8:1", Some("/dev/sda1"));
        manager.begin(&mut dev).unwrap();
        let first = dev.watch_descriptor().unwrap();
        manager.begin(&mut dev).unwrap();
        let second = dev.watch_descriptor().unwrap();

        assert_ne!(first, second);
        assert!(manager.lookup(first).unwrap().is_some());
        assert!(manager.lookup(second).unwrap().is_some());
    }

    #[test]
    fn test_end_clears_descriptor_and_entry() {
        let tmp = TempDir::new().unwrap();
        let manager = manager_in(&tmp, &[("b8:1", Some("/dev/sda1"))]);

        let mut dev = device("b8:1", Some("/dev/sda1"));
        manager.begin(&mut dev).unwrap();
        let wd = dev.watch_descriptor().unwrap();

        manager.end(&mut dev).unwrap();
        assert_eq!(dev.watch_descriptor(), None);
        assert_eq!(manager.notify().removed(), vec![wd]);
        assert!(manager.lookup(wd).unwrap().is_none());
    }

    #[test]
    fn test_end_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let manager = manager_in(&tmp, &[("b8:1", Some("/dev/sda1"))]);

        let mut dev = device("b8:1", Some("/dev/sda1"));
        manager.begin(&mut dev).unwrap();
        manager.end(&mut dev).unwrap();
        manager.end(&mut dev).unwrap();
        assert_eq!(dev.watch_descriptor(), None);

        // Only the first end reached the kernel.
        assert_eq!(manager.notify().removed().len(), 1);
    }

    #[test]
    fn test_end_on_never_watched_device_is_noop() {
        let tmp = TempDir::new().unwrap();
        let manager = manager_in(&tmp, &[]);

        let mut dev = device("b8:1", Some("/dev/sda1"));
        manager.end(&mut dev).unwrap();
        assert!(manager.notify().removed().is_empty());
    }

    #[test]
    fn test_lookup_miss_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let manager = manager_in(&tmp, &[]);
        assert!(manager.lookup(17).unwrap().is_none());
    }

    #[test]
    fn test_lookup_rejects_negative_descriptor() {
        let tmp = TempDir::new().unwrap();
        let manager = manager_in(&tmp, &[]);
        assert!(matches!(
            manager.lookup(-1),
            Err(WatchError::InvalidDescriptor { wd: -1 })
        ));
    }

    #[test]
    fn test_lookup_unresolvable_entry_is_hard_error() {
        let tmp = TempDir::new().unwrap();
        let manager = manager_in(&tmp, &[("b8:1", Some("/dev/sda1"))]);

        let mut dev = device("b8:1", Some("/dev/sda1"));
        manager.begin(&mut dev).unwrap();
        let wd = dev.watch_descriptor().unwrap();

        // Device disappears from the system, entry stays behind.
        let manager = WatchManager::new(
            FakeNotify::new(),
            SymlinkStore::with_root(tmp.path().join("watch")),
            FakeResolver::new(&[]),
        );
        assert!(matches!(
            manager.lookup(wd),
            Err(WatchError::Device(DeviceError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_restore_assigns_fresh_descriptor() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("watch");

        // Previous instance persisted descriptor 5 -> b8:1, then crashed.
        SymlinkStore::with_root(&root).put(5, "b8:1").unwrap();

        let manager = manager_in(&tmp, &[("b8:1", Some("/dev/sda1"))]);
        manager.restore().unwrap();

        // Identity preserved, numeric identity discarded.
        assert!(manager.lookup(5).unwrap().is_none());
        let found = manager.lookup(100).unwrap().unwrap();
        assert_eq!(found.device_id(), "b8:1");

        let mut name = root.into_os_string();
        name.push(".old");
        assert!(!PathBuf::from(name).exists());
    }

    #[test]
    fn test_restore_skips_unresolvable_entries() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("watch");

        let seed = SymlinkStore::with_root(&root);
        seed.put(5, "b8:1").unwrap();
        seed.put(6, "b9:9").unwrap();

        let manager = manager_in(&tmp, &[("b8:1", Some("/dev/sda1"))]);
        manager.restore().unwrap();

        let names: Vec<String> = std::fs::read_dir(&root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["100".to_string()]);
        assert_eq!(
            manager.lookup(100).unwrap().unwrap().device_id(),
            "b8:1"
        );
    }

    #[test]
    fn test_restore_tolerates_begin_failure() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("watch");

        let seed = SymlinkStore::with_root(&root);
        seed.put(5, "n2").unwrap();
        seed.put(6, "b8:1").unwrap();

        // n2 resolves but has no device node, so its begin() fails.
        let manager = manager_in(&tmp, &[("n2", None), ("b8:1", Some("/dev/sda1"))]);
        manager.restore().unwrap();

        let entries = std::fs::read_dir(&root).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_restore_without_store_is_noop() {
        let tmp = TempDir::new().unwrap();
        let manager = manager_in(&tmp, &[("b8:1", Some("/dev/sda1"))]);
        manager.restore().unwrap();
        assert!(!tmp.path().join("watch").exists());
    }
}
