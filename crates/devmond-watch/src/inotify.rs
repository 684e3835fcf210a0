//! The process-wide inotify handle.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

use crate::error::Result;

/// Kernel notification backend the watch manager registers against.
///
/// Production code uses [`Inotify`]; tests substitute a fake that hands out
/// descriptors without touching the kernel.
pub trait NotifyBackend {
    /// Registers interest in `devnode` being closed after a write.
    /// Returns the kernel-assigned watch descriptor.
    fn add_watch(&self, devnode: &Path) -> io::Result<i32>;

    /// Removes the watch behind `wd`. The kernel may already have dropped it
    /// (e.g. the node was deleted), in which case this fails with `EINVAL`.
    fn remove_watch(&self, wd: i32) -> io::Result<()>;
}

/// Owner of the inotify descriptor, created once at daemon startup.
///
/// Worker processes are forked from the daemon and therefore share this
/// descriptor; watch descriptors they allocate all live in the same kernel
/// watch table. The descriptor is created close-on-exec so it does not leak
/// into unrelated programs those workers execute.
#[derive(Debug)]
pub struct Inotify {
    fd: RawFd,
}

impl Inotify {
    /// Creates the inotify descriptor. Not idempotent; call exactly once.
    pub fn init() -> Result<Self> {
        let fd = unsafe { libc::inotify_init1(libc::IN_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error().into());
        }
        tracing::debug!("Created inotify descriptor: fd={}", fd);
        Ok(Self { fd })
    }
}

impl NotifyBackend for Inotify {
    fn add_watch(&self, devnode: &Path) -> io::Result<i32> {
        let path = CString::new(devnode.as_os_str().as_bytes())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;
        let wd = unsafe { libc::inotify_add_watch(self.fd, path.as_ptr(), libc::IN_CLOSE_WRITE) };
        if wd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(wd)
    }

    fn remove_watch(&self, wd: i32) -> io::Result<()> {
        let r = unsafe { libc::inotify_rm_watch(self.fd, wd as _) };
        if r < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl AsRawFd for Inotify {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for Inotify {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
