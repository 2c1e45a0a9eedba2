//! Engine configuration.
//!
//! The only tunable the engine has is where overlay upper/work directories
//! live. It is resolved in this order:
//!
//! 1. an explicit directory ([`EngineConfig::new`]),
//! 2. the `MOUNTFORGE_OVERLAY_DIR` environment variable,
//! 3. `<home>/.mountforge/overlay`, with `home` supplied by the caller,
//! 4. `/var/lib/mountforge/overlay`.
//!
//! The home directory is always passed in; nothing here consults global
//! process state on its own.

use crate::constants::{HOME_OVERLAY_SUBDIR, OVERLAY_DIR_ENV, SYSTEM_OVERLAY_DIR};
use crate::overlay::OverlayLayout;
use std::path::{Path, PathBuf};

/// Configuration shared by the spec assembler and the composer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Base directory for per-job overlay storage.
    ///
    /// May need to hold large amounts of data: every writable overlay
    /// accrues its changes here.
    pub overlay_dir: PathBuf,
}

impl EngineConfig {
    /// Creates a config with an explicit overlay directory.
    pub fn new(overlay_dir: impl Into<PathBuf>) -> Self {
        Self {
            overlay_dir: overlay_dir.into(),
        }
    }

    /// Resolves the config from the process environment.
    pub fn from_env(home: Option<&Path>) -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), home)
    }

    /// Resolves the config from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F, home: Option<&Path>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(OVERLAY_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            return Self::new(dir);
        }
        match home {
            Some(home) => Self::new(home.join(HOME_OVERLAY_SUBDIR)),
            None => Self::new(SYSTEM_OVERLAY_DIR),
        }
    }

    /// Returns the overlay layout rooted at the configured directory.
    pub fn overlay_layout(&self) -> OverlayLayout {
        OverlayLayout::new(self.overlay_dir.clone())
    }
}
