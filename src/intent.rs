//! Mount intents and execution specs.
//!
//! An [`ExecutionSpec`] is what the layers above hand to the engine: a job
//! name, a command, a working directory, and the mounts the job wants. The
//! engine only reads it.
//!
//! The whole mount set is validated before anything acts on any single
//! entry, so an illegal set never causes a partial setup.

use crate::constants::{
    OVERLAY_LOWERDIR_FORBIDDEN, RESERVED_DESTINATION_PREFIXES, validate_job_name,
};
use crate::error::{Error, Result};
use crate::overlay::check_destination_segment;
use crate::paths::{clean_destination, is_within};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

// =============================================================================
// Mount Mode
// =============================================================================

/// Desired effect of a mount on its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountMode {
    /// Source is visible read-only.
    ReadOnly,
    /// Destination is writable; changes accrue in an overlay upper layer and
    /// the source is never modified.
    Overlay,
    /// Source is mounted straight through; writes reach it.
    Writable,
    /// Fresh, empty, writable tmpfs. The source is ignored.
    Tmp,
}

impl std::fmt::Display for MountMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "readonly"),
            Self::Overlay => write!(f, "overlay"),
            Self::Writable => write!(f, "writable"),
            Self::Tmp => write!(f, "tmp"),
        }
    }
}

impl std::str::FromStr for MountMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "readonly" | "ro" => Ok(Self::ReadOnly),
            "overlay" => Ok(Self::Overlay),
            "writable" | "rw" => Ok(Self::Writable),
            "tmp" | "tmpfs" => Ok(Self::Tmp),
            other => Err(format!("unknown mount mode: {}", other)),
        }
    }
}

// =============================================================================
// Mount Intent
// =============================================================================

/// One requested mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountIntent {
    /// Host path the mount comes from.
    #[serde(default)]
    pub source: PathBuf,
    /// Absolute, slash-separated path inside the container root.
    pub destination: String,
    /// Desired effect.
    pub mode: MountMode,
}

impl MountIntent {
    /// Creates a mount intent.
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<String>, mode: MountMode) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            mode,
        }
    }

    /// Returns the normalized destination.
    pub fn cleaned_destination(&self) -> Result<String> {
        clean_destination(&self.destination)
    }

    /// Returns true if this intent targets the container root.
    pub fn targets_root(&self) -> bool {
        matches!(self.cleaned_destination().as_deref(), Ok("/"))
    }
}

// =============================================================================
// Execution Spec
// =============================================================================

/// Everything the engine needs to know about one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSpec {
    /// Job identifier; namespaces overlay storage.
    pub name: String,
    /// Process argument list.
    pub command: Vec<String>,
    /// Requested mounts.
    #[serde(default)]
    mounts: Vec<MountIntent>,
    /// Working directory inside the container.
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
    /// Extra `KEY=VALUE` environment entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    /// Hostname override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

fn default_working_dir() -> String {
    "/".to_string()
}

impl ExecutionSpec {
    /// Creates and validates an execution spec.
    pub fn new(
        name: impl Into<String>,
        command: Vec<String>,
        mounts: Vec<MountIntent>,
        working_dir: impl Into<String>,
    ) -> Result<Self> {
        let spec = Self {
            name: name.into(),
            command,
            mounts,
            working_dir: working_dir.into(),
            env: Vec::new(),
            hostname: None,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Parses and validates an execution spec from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let spec: Self =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Adds environment entries.
    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    /// Overrides the hostname.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Returns the requested mounts in caller order.
    pub fn mounts(&self) -> &[MountIntent] {
        &self.mounts
    }

    /// Returns the intent targeting `/`, if any.
    pub fn root_intent(&self) -> Option<&MountIntent> {
        self.mounts.iter().find(|m| m.targets_root())
    }

    /// Returns every intent except the root one, sorted by cleaned
    /// destination (parents before children).
    pub fn non_root_mounts(&self) -> Result<Vec<(String, &MountIntent)>> {
        let mut rest = Vec::with_capacity(self.mounts.len());
        for intent in &self.mounts {
            let destination = intent.cleaned_destination()?;
            if destination != "/" {
                rest.push((destination, intent));
            }
        }
        rest.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rest)
    }

    /// Checks the whole spec for shape errors.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidJobName`] for an unusable name.
    /// - [`Error::InvalidDestination`] / [`Error::PathEscape`] for a bad
    ///   destination.
    /// - [`Error::ReservedDestination`] for a destination at or below
    ///   `/proc`, `/dev` or `/sys`.
    /// - [`Error::DuplicateDestination`] when two intents share a cleaned
    ///   destination.
    /// - [`Error::InvalidDestination`] when an overlay destination is too
    ///   long to name its storage directory.
    /// - [`Error::SpecBuildFailed`] for an empty command, a relative
    ///   working directory, malformed env entries, a missing or relative
    ///   source, or an overlay path that cannot be expressed as a mount
    ///   option.
    pub fn validate(&self) -> Result<()> {
        validate_job_name(&self.name).map_err(|reason| Error::InvalidJobName {
            name: self.name.clone(),
            reason: reason.to_string(),
        })?;

        if self.command.is_empty() {
            return Err(Error::SpecBuildFailed("command cannot be empty".to_string()));
        }
        if !self.working_dir.starts_with('/') {
            return Err(Error::SpecBuildFailed(format!(
                "working directory must be absolute: {}",
                self.working_dir
            )));
        }
        if let Some(bad) = self.env.iter().find(|e| !e.contains('=') || e.starts_with('=')) {
            return Err(Error::SpecBuildFailed(format!(
                "environment entry is not KEY=VALUE: {}",
                bad
            )));
        }

        let mut seen = HashSet::with_capacity(self.mounts.len());
        for intent in &self.mounts {
            let destination = intent.cleaned_destination()?;

            if RESERVED_DESTINATION_PREFIXES
                .iter()
                .any(|prefix| is_within(&destination, prefix))
            {
                return Err(Error::ReservedDestination(destination));
            }

            // A read-only root is still an overlay.
            let overlay_backed = intent.mode == MountMode::Overlay
                || (intent.mode == MountMode::ReadOnly && destination == "/");
            check_source(&intent.source, intent.mode, overlay_backed)?;
            if overlay_backed {
                check_destination_segment(&destination)?;
            }

            if !seen.insert(destination.clone()) {
                return Err(Error::DuplicateDestination(destination));
            }
        }

        Ok(())
    }
}

/// Checks the source of a mount in `mode`.
///
/// Every mode but [`MountMode::Tmp`] needs an absolute host path. When
/// `overlay_backed`, the path becomes a `lowerdir=` value and must not
/// contain any of [`OVERLAY_LOWERDIR_FORBIDDEN`].
pub(crate) fn check_source(source: &Path, mode: MountMode, overlay_backed: bool) -> Result<()> {
    if mode == MountMode::Tmp {
        return Ok(());
    }
    if source.as_os_str().is_empty() {
        return Err(Error::SpecBuildFailed(format!("{} mount requires a source", mode)));
    }
    if !source.is_absolute() {
        return Err(Error::SpecBuildFailed(format!(
            "mount source must be absolute: {}",
            source.display()
        )));
    }
    if overlay_backed {
        let lossy = source.to_string_lossy();
        if let Some(bad) = lossy.chars().find(|c| OVERLAY_LOWERDIR_FORBIDDEN.contains(c)) {
            return Err(Error::SpecBuildFailed(format!(
                "overlay lower directory cannot contain '{}': {}",
                bad,
                source.display()
            )));
        }
    }
    Ok(())
}
