//! Root mount resolution.
//!
//! The mount targeting `/` is special. The runtime has to create mount
//! points for every other mount somewhere inside the root, so even a root
//! that ends up read-only is usually backed by a writable overlay; the
//! read-only flag is then asserted separately through `root.readonly`,
//! which the runtime applies after creating its mount points.
//!
//! | Intent at `/`  | Strategy                             | `root.readonly` |
//! |----------------|--------------------------------------|-----------------|
//! | none           | runtime's own `rootfs` dir           | `true`          |
//! | `ReadOnly`     | overlay (lower = source)             | `true`          |
//! | `Overlay`      | overlay (lower = source)             | `true`          |
//! | `Writable`     | recursive bind of source             | `false`         |
//! | `Tmp`          | fresh tmpfs                          | `false`         |
//!
//! A writable host root is almost never what you want: the runtime's
//! mount-point `mkdir`s land directly on the host.

use crate::bundle::Mount;
use crate::intent::{MountIntent, MountMode};
use crate::overlay::{OverlayDirs, OverlayLayout};
use std::path::PathBuf;

/// How the container root is provided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootStrategy {
    /// No root mount; the runtime uses the bundle's rootfs directory.
    RuntimeDefault,
    /// Overlay of job storage over a lower directory.
    Overlay { lower: PathBuf, dirs: OverlayDirs },
    /// The source itself, writable.
    Bind { source: PathBuf },
    /// An empty tmpfs.
    Tmpfs,
}

/// Outcome of root resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPlan {
    /// How the root is provided.
    pub strategy: RootStrategy,
    /// Value for `root.readonly`.
    pub readonly: bool,
}

impl RootPlan {
    /// Returns the runtime mount entry for `/`, if the strategy needs one.
    pub fn mount(&self) -> Option<Mount> {
        match &self.strategy {
            RootStrategy::RuntimeDefault => None,
            RootStrategy::Overlay { lower, dirs } => Some(Mount::overlay(lower, dirs, "/")),
            RootStrategy::Bind { source } => Some(Mount::bind(source, "/", false)),
            RootStrategy::Tmpfs => Some(Mount::tmpfs("/")),
        }
    }
}

/// Decides the root strategy for a job.
///
/// `intent` must be the job's mount targeting `/`, if it has one.
pub fn resolve_root(intent: Option<&MountIntent>, job: &str, layout: &OverlayLayout) -> RootPlan {
    let Some(intent) = intent else {
        return RootPlan {
            strategy: RootStrategy::RuntimeDefault,
            readonly: true,
        };
    };

    match intent.mode {
        // Still an overlay: other mounts need somewhere to create their
        // mount points.
        MountMode::ReadOnly | MountMode::Overlay => RootPlan {
            strategy: RootStrategy::Overlay {
                lower: intent.source.clone(),
                dirs: layout.dirs(job, "/"),
            },
            readonly: true,
        },
        MountMode::Writable => RootPlan {
            strategy: RootStrategy::Bind {
                source: intent.source.clone(),
            },
            readonly: false,
        },
        MountMode::Tmp => RootPlan {
            strategy: RootStrategy::Tmpfs,
            readonly: false,
        },
    }
}
