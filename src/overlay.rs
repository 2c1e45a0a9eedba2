//! # Overlay Storage Layout
//!
//! Every overlay mount needs a writable upper layer and a work directory on
//! the host. They are namespaced per job so concurrent jobs never share
//! overlay storage:
//!
//! ```text
//! <overlay_dir>/
//! └── job1/                 escape("job1")
//!     ├── %2F/              escape("/")
//!     │   ├── layer/
//!     │   └── work/
//!     └── %2Fsrc%2Fapp/     escape("/src/app")
//!         ├── layer/
//!         └── work/
//! ```
//!
//! [`escape_segment`] percent-encodes everything outside the URL path
//! segment character set, including `/` and `%` itself, so any job name or
//! mount destination collapses into exactly one path segment and distinct
//! inputs never collide.

use crate::constants::{
    MAX_PATH_SEGMENT_LEN, OVERLAY_LAYER_DIR, OVERLAY_WORK_DIR, validate_job_name,
};
use crate::error::{Error, Result};
use crate::intent::{ExecutionSpec, MountMode};
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Upper and work directories for one overlay mount.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OverlayDirs {
    /// Writable upper layer (`upperdir=`).
    pub upper: PathBuf,
    /// Overlayfs scratch directory (`workdir=`).
    pub work: PathBuf,
}

/// Deterministic mapping from (job, destination) to overlay storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayLayout {
    base_dir: PathBuf,
}

impl OverlayLayout {
    /// Creates a layout rooted at `base_dir`. Nothing is touched on disk.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Returns the overlay base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns the directory holding all overlay storage of one job.
    pub fn job_dir(&self, job: &str) -> PathBuf {
        self.base_dir.join(escape_segment(job))
    }

    /// Returns the directory holding one mount's overlay storage.
    pub fn mount_dir(&self, job: &str, destination: &str) -> PathBuf {
        self.job_dir(job).join(escape_segment(destination))
    }

    /// Computes the upper and work directories for an overlay mount.
    ///
    /// Pure function of its inputs.
    pub fn dirs(&self, job: &str, destination: &str) -> OverlayDirs {
        let mount_dir = self.mount_dir(job, destination);
        OverlayDirs {
            upper: mount_dir.join(OVERLAY_LAYER_DIR),
            work: mount_dir.join(OVERLAY_WORK_DIR),
        }
    }

    /// Creates the upper/work directories of one overlay mount.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidJobName`], or [`Error::InvalidDestination`] if the
    /// escaped destination does not fit in one file name.
    pub fn create(&self, job: &str, destination: &str) -> Result<OverlayDirs> {
        check_job(job)?;
        check_destination_segment(destination)?;
        let dirs = self.dirs(job, destination);
        for dir in [&dirs.upper, &dirs.work] {
            fs::create_dir_all(dir).map_err(|e| Error::DestinationPrepFailed {
                path: dir.clone(),
                reason: format!("cannot create overlay directory: {}", e),
            })?;
        }
        debug!(job, destination, upper = %dirs.upper.display(), "prepared overlay directories");
        Ok(dirs)
    }

    /// Creates overlay storage for every overlay-backed mount of a job.
    ///
    /// A read-only root is also backed by an overlay, so it is included.
    pub fn prepare(&self, spec: &ExecutionSpec) -> Result<Vec<OverlayDirs>> {
        spec.validate()?;
        let mut prepared = Vec::new();
        for intent in spec.mounts() {
            let destination = intent.cleaned_destination()?;
            let needs_overlay = match intent.mode {
                MountMode::Overlay => true,
                MountMode::ReadOnly => destination == "/",
                MountMode::Writable | MountMode::Tmp => false,
            };
            if needs_overlay {
                prepared.push(self.create(&spec.name, &destination)?);
            }
        }
        info!(job = %spec.name, count = prepared.len(), "overlay storage ready");
        Ok(prepared)
    }

    /// Deletes all overlay storage of a job.
    ///
    /// Must only be called after every overlay of the job is unmounted.
    /// Missing storage is not an error.
    pub fn remove_job(&self, job: &str) -> Result<()> {
        check_job(job)?;
        let dir = self.job_dir(job);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!(job, dir = %dir.display(), "removed overlay storage");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn check_job(job: &str) -> Result<()> {
    validate_job_name(job).map_err(|reason| Error::InvalidJobName {
        name: job.to_string(),
        reason: reason.to_string(),
    })
}

/// Checks that `destination` escapes into a single usable file name.
///
/// Every `/` costs three bytes once escaped, so deep destinations hit
/// [`MAX_PATH_SEGMENT_LEN`] long before `PATH_MAX`.
pub(crate) fn check_destination_segment(destination: &str) -> Result<()> {
    let escaped = escape_segment(destination).len();
    if escaped > MAX_PATH_SEGMENT_LEN {
        return Err(Error::InvalidDestination {
            destination: destination.to_string(),
            reason: format!(
                "overlay storage name is {} bytes once escaped (limit {})",
                escaped, MAX_PATH_SEGMENT_LEN
            ),
        });
    }
    Ok(())
}

/// Percent-encodes `input` into a single safe path segment.
///
/// Unreserved characters (`A-Z a-z 0-9 - . _ ~`) and the sub-delimiters
/// `$ & + : = @` pass through; every other byte becomes `%XX`. A segment
/// made only of dots would still be a special directory entry, so its dots
/// are encoded too.
pub fn escape_segment(input: &str) -> String {
    let dots_only = !input.is_empty() && input.bytes().all(|b| b == b'.');
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        let keep = match byte {
            b'.' => !dots_only,
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' => true,
            b'-' | b'_' | b'~' | b'$' | b'&' | b'+' | b':' | b'=' | b'@' => true,
            _ => false,
        };
        if keep {
            out.push(byte as char);
        } else {
            let _ = write!(out, "%{:02X}", byte);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_root() {
        assert_eq!(escape_segment("/"), "%2F");
    }

    #[test]
    fn test_escape_percent_is_escaped() {
        assert_eq!(escape_segment("%2F"), "%252F");
    }

    #[test]
    fn test_escape_dot_segments() {
        assert_eq!(escape_segment("."), "%2E");
        assert_eq!(escape_segment(".."), "%2E%2E");
        assert_eq!(escape_segment("a.b"), "a.b");
    }

    #[test]
    fn test_escape_unicode_is_encoded_bytewise() {
        assert_eq!(escape_segment("é"), "%C3%A9");
    }
}
