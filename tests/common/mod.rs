//! Shared test helpers.
//!
//! [`RecordingMounter`] stands in for the kernel: it records every call in
//! order and can be told to fail a specific one, so composition and
//! rollback can be tested without privileges.

#![allow(dead_code)]

use mountforge::Mounter;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One recorded kernel call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Bind { source: PathBuf, target: PathBuf },
    RemountReadonly { target: PathBuf },
    Overlay { lower: PathBuf, upper: PathBuf, work: PathBuf, target: PathBuf },
    Tmpfs { target: PathBuf },
    Unmount { target: PathBuf },
}

impl Call {
    pub fn target(&self) -> &Path {
        match self {
            Self::Bind { target, .. }
            | Self::RemountReadonly { target }
            | Self::Overlay { target, .. }
            | Self::Tmpfs { target }
            | Self::Unmount { target } => target,
        }
    }

    pub fn is_mount(&self) -> bool {
        matches!(self, Self::Bind { .. } | Self::Overlay { .. } | Self::Tmpfs { .. })
    }
}

/// Which calls should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Never,
    /// The n-th mount-creating call (bind/overlay/tmpfs), 1-based.
    NthMount(usize),
    /// Every read-only remount.
    Remount,
    /// The n-th unmount call, 1-based. The attempt is still recorded.
    NthUnmount(usize),
}

#[derive(Debug)]
pub struct RecordingMounter {
    calls: Mutex<Vec<Call>>,
    fail_on: FailOn,
}

impl RecordingMounter {
    pub fn new() -> Self {
        Self::failing(FailOn::Never)
    }

    pub fn failing(fail_on: FailOn) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on,
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mounted_targets(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter(Call::is_mount)
            .map(|c| c.target().to_path_buf())
            .collect()
    }

    pub fn unmounted_targets(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Unmount { .. }))
            .map(|c| c.target().to_path_buf())
            .collect()
    }

    fn record_mount(&self, call: Call) -> io::Result<()> {
        let mut calls = self.calls.lock().unwrap();
        let nth = calls.iter().filter(|c| c.is_mount()).count() + 1;
        if self.fail_on == FailOn::NthMount(nth) {
            return Err(io::Error::from_raw_os_error(1));
        }
        calls.push(call);
        Ok(())
    }
}

impl Mounter for RecordingMounter {
    fn bind(&self, source: &Path, target: &Path) -> io::Result<()> {
        self.record_mount(Call::Bind {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
        })
    }

    fn remount_readonly(&self, _source: &Path, target: &Path) -> io::Result<()> {
        if self.fail_on == FailOn::Remount {
            return Err(io::Error::from_raw_os_error(13));
        }
        self.calls.lock().unwrap().push(Call::RemountReadonly {
            target: target.to_path_buf(),
        });
        Ok(())
    }

    fn overlay(&self, lower: &Path, upper: &Path, work: &Path, target: &Path) -> io::Result<()> {
        self.record_mount(Call::Overlay {
            lower: lower.to_path_buf(),
            upper: upper.to_path_buf(),
            work: work.to_path_buf(),
            target: target.to_path_buf(),
        })
    }

    fn tmpfs(&self, target: &Path) -> io::Result<()> {
        self.record_mount(Call::Tmpfs {
            target: target.to_path_buf(),
        })
    }

    fn unmount(&self, target: &Path) -> io::Result<()> {
        let mut calls = self.calls.lock().unwrap();
        let nth = calls
            .iter()
            .filter(|c| matches!(c, Call::Unmount { .. }))
            .count()
            + 1;
        calls.push(Call::Unmount {
            target: target.to_path_buf(),
        });
        if self.fail_on == FailOn::NthUnmount(nth) {
            return Err(io::Error::from_raw_os_error(16));
        }
        Ok(())
    }
}
