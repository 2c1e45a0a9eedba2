//! Error types for mount composition and runtime-spec generation.

use std::path::PathBuf;

/// Result type alias for mount composition operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while composing mounts or building a runtime spec.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Path Errors
    // =========================================================================
    /// Mount source does not exist (or cannot be inspected).
    #[error("mount source {path} not found: {reason}")]
    SourceNotFound { path: PathBuf, reason: String },

    /// Destination would resolve outside of its root.
    ///
    /// Never downgraded to a warning.
    #[error("path escape: {path} resolves outside of root {root}")]
    PathEscape { path: PathBuf, root: PathBuf },

    /// Destination is not an absolute, slash-separated path.
    #[error("invalid destination '{destination}': {reason}")]
    InvalidDestination { destination: String, reason: String },

    /// Could not create or inspect the node a mount lands on.
    #[error("cannot prepare mount destination {path}: {reason}")]
    DestinationPrepFailed { path: PathBuf, reason: String },

    // =========================================================================
    // Kernel Errors
    // =========================================================================
    /// A mount syscall failed.
    #[error("mount of {from} onto {target} failed: {reason}")]
    MountSyscallFailed {
        from: String,
        target: PathBuf,
        reason: String,
    },

    /// An unmount syscall failed.
    #[error("unmount of {target} failed: {reason}")]
    UnmountFailed { target: PathBuf, reason: String },

    /// Teardown finished but left mounts behind.
    #[error("rollback incomplete: {} teardown step(s) failed", .0.len())]
    RollbackIncomplete(Vec<Error>),

    // =========================================================================
    // Validation Errors
    // =========================================================================
    /// More than one mount targets the same cleaned destination.
    #[error("duplicate mount destination: {0}")]
    DuplicateDestination(String),

    /// Destination lies in a subtree owned by the essential mounts.
    #[error("reserved mount destination: {0} (/proc, /dev and /sys are managed by the engine)")]
    ReservedDestination(String),

    /// Job name cannot be used to namespace overlay storage.
    #[error("invalid job name '{name}': {reason}")]
    InvalidJobName { name: String, reason: String },

    // =========================================================================
    // Spec Errors
    // =========================================================================
    /// Runtime spec could not be assembled.
    #[error("failed to build runtime spec: {0}")]
    SpecBuildFailed(String),

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns true for errors that indicate an attempted sandbox escape
    /// or an illegal mount set, as opposed to an environmental failure.
    pub fn is_security_violation(&self) -> bool {
        matches!(
            self,
            Self::PathEscape { .. } | Self::ReservedDestination(_) | Self::DuplicateDestination(_)
        )
    }
}
