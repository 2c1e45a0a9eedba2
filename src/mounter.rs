//! Mount syscall seam.
//!
//! Everything that mutates the kernel mount table goes through the
//! [`Mounter`] trait. [`SystemMounter`] issues the real `mount(2)` /
//! `umount2(2)` calls; tests substitute a recording implementation so the
//! composition logic can be exercised without privileges.
//!
//! All calls are blocking and cannot be cancelled once issued.

use std::io;
use std::path::Path;

/// Kernel mount operations used by the composer.
pub trait Mounter: Send + Sync {
    /// Recursively bind mounts `source` onto `target` (`MS_BIND | MS_REC`).
    fn bind(&self, source: &Path, target: &Path) -> io::Result<()>;

    /// Remounts an existing bind mount at `target` read-only.
    fn remount_readonly(&self, source: &Path, target: &Path) -> io::Result<()>;

    /// Mounts an overlay of `upper` over `lower` at `target`.
    fn overlay(&self, lower: &Path, upper: &Path, work: &Path, target: &Path) -> io::Result<()>;

    /// Mounts a fresh tmpfs at `target`.
    fn tmpfs(&self, target: &Path) -> io::Result<()>;

    /// Unmounts `target`.
    fn unmount(&self, target: &Path) -> io::Result<()>;
}

/// Options string for a writable, world-sticky tmpfs.
pub const TMPFS_OPTIONS: &str = "mode=1777";

/// Builds the overlayfs option string for a single lower layer.
pub fn overlay_options(lower: &Path, upper: &Path, work: &Path) -> String {
    format!(
        "lowerdir={},upperdir={},workdir={}",
        lower.display(),
        upper.display(),
        work.display()
    )
}

/// [`Mounter`] backed by the host kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMounter;

impl SystemMounter {
    /// Creates a system mounter.
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "linux")]
mod sys {
    use std::ffi::CString;
    use std::io;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    pub(super) fn cstring(path: &Path) -> io::Result<CString> {
        CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }

    pub(super) fn mount(
        source: &str,
        target: &Path,
        fstype: Option<&str>,
        flags: libc::c_ulong,
        data: Option<&str>,
    ) -> io::Result<()> {
        let source = CString::new(source).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let target = cstring(target)?;
        let fstype = fstype
            .map(CString::new)
            .transpose()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let data = data
            .map(CString::new)
            .transpose()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // SAFETY: every pointer is either null or a valid NUL-terminated
        // string that outlives the call.
        let result = unsafe {
            libc::mount(
                source.as_ptr(),
                target.as_ptr(),
                fstype.as_ref().map_or(std::ptr::null(), |s| s.as_ptr()),
                flags,
                data.as_ref()
                    .map_or(std::ptr::null(), |s| s.as_ptr().cast::<libc::c_void>()),
            )
        };
        if result != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub(super) fn umount(target: &Path) -> io::Result<()> {
        let target = cstring(target)?;
        // SAFETY: `target` is a valid NUL-terminated string.
        let result = unsafe { libc::umount2(target.as_ptr(), 0) };
        if result != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
impl Mounter for SystemMounter {
    fn bind(&self, source: &Path, target: &Path) -> io::Result<()> {
        sys::mount(
            &source.to_string_lossy(),
            target,
            Some("bind"),
            libc::MS_BIND | libc::MS_REC,
            None,
        )
    }

    fn remount_readonly(&self, source: &Path, target: &Path) -> io::Result<()> {
        sys::mount(
            &source.to_string_lossy(),
            target,
            Some("bind"),
            libc::MS_BIND | libc::MS_REC | libc::MS_RDONLY | libc::MS_REMOUNT,
            None,
        )
    }

    fn overlay(&self, lower: &Path, upper: &Path, work: &Path, target: &Path) -> io::Result<()> {
        let options = overlay_options(lower, upper, work);
        sys::mount("overlay", target, Some("overlay"), 0, Some(&options))
    }

    fn tmpfs(&self, target: &Path) -> io::Result<()> {
        sys::mount(
            "tmpfs",
            target,
            Some("tmpfs"),
            libc::MS_NOSUID | libc::MS_NODEV,
            Some(TMPFS_OPTIONS),
        )
    }

    fn unmount(&self, target: &Path) -> io::Result<()> {
        sys::umount(target)
    }
}

#[cfg(not(target_os = "linux"))]
impl Mounter for SystemMounter {
    fn bind(&self, _source: &Path, _target: &Path) -> io::Result<()> {
        Err(unsupported())
    }

    fn remount_readonly(&self, _source: &Path, _target: &Path) -> io::Result<()> {
        Err(unsupported())
    }

    fn overlay(&self, _lower: &Path, _upper: &Path, _work: &Path, _target: &Path) -> io::Result<()> {
        Err(unsupported())
    }

    fn tmpfs(&self, _target: &Path) -> io::Result<()> {
        Err(unsupported())
    }

    fn unmount(&self, _target: &Path) -> io::Result<()> {
        Err(unsupported())
    }
}

#[cfg(not(target_os = "linux"))]
fn unsupported() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "mount composition requires Linux",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_options_order() {
        let opts = overlay_options(
            Path::new("/lower"),
            Path::new("/o/layer"),
            Path::new("/o/work"),
        );
        assert_eq!(opts, "lowerdir=/lower,upperdir=/o/layer,workdir=/o/work");
    }
}
