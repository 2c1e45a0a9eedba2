//! OCI runtime spec document.
//!
//! Typed mirror of the `config.json` a low-level runtime (runc, crun,
//! youki) consumes. Only the per-job fields ever change; everything else
//! comes from [`RuntimeSpec::base`], a typed template:
//!
//! | Field                | Source                          |
//! |----------------------|---------------------------------|
//! | `process.args`       | job command                     |
//! | `process.cwd`        | job working directory           |
//! | `process.env`        | template + job overrides        |
//! | `root.readonly`      | root mount resolution           |
//! | `hostname`           | template, or job override       |
//! | `mounts`             | root + essentials + job mounts  |
//! | everything else      | template                        |
//!
//! Per-job values are applied through a [`SpecPatch`] by plain field
//! assignment.

use crate::constants::{
    BUNDLE_CONFIG_FILE, DEFAULT_CAPABILITIES, DEFAULT_HOSTNAME, DEFAULT_NOFILE_LIMIT,
    DEFAULT_PATH_ENV, DEFAULT_ROOTFS_PATH, MAPPED_HOST_ID, MASKED_PATHS, OCI_RUNTIME_SPEC_VERSION,
    READONLY_PATHS,
};
use crate::error::{Error, Result};
use crate::overlay::OverlayDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

// =============================================================================
// OCI Runtime Spec Types
// =============================================================================

/// OCI Runtime Spec (`config.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSpec {
    pub oci_version: String,
    pub process: Process,
    pub root: Root,
    pub hostname: String,
    pub mounts: Vec<Mount>,
    pub linux: Linux,
}

/// OCI process config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    pub terminal: bool,
    pub user: User,
    pub args: Vec<String>,
    pub env: Vec<String>,
    pub cwd: String,
    pub capabilities: Capabilities,
    pub rlimits: Vec<Rlimit>,
    pub no_new_privileges: bool,
}

/// OCI user config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: u32,
    pub gid: u32,
}

/// OCI capability sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub bounding: Vec<String>,
    pub effective: Vec<String>,
    pub inheritable: Vec<String>,
    pub permitted: Vec<String>,
    pub ambient: Vec<String>,
}

impl Capabilities {
    /// Uses the same list for every set.
    pub fn uniform(caps: &[&str]) -> Self {
        let caps: Vec<String> = caps.iter().map(|c| c.to_string()).collect();
        Self {
            bounding: caps.clone(),
            effective: caps.clone(),
            inheritable: caps.clone(),
            permitted: caps.clone(),
            ambient: caps,
        }
    }
}

/// OCI POSIX rlimit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rlimit {
    #[serde(rename = "type")]
    pub limit_type: String,
    pub hard: u64,
    pub soft: u64,
}

/// OCI root filesystem config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    pub path: String,
    pub readonly: bool,
}

/// OCI mount config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub destination: String,
    #[serde(rename = "type")]
    pub mount_type: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Mount {
    fn new(destination: &str, mount_type: &str, source: &str, options: &[&str]) -> Self {
        Self {
            destination: destination.to_string(),
            mount_type: mount_type.to_string(),
            source: source.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
        }
    }

    /// Recursive bind of a host path, optionally read-only.
    pub fn bind(source: &Path, destination: &str, readonly: bool) -> Self {
        let options: &[&str] = if readonly { &["rbind", "ro"] } else { &["rbind"] };
        Self::new(destination, "none", &source.to_string_lossy(), options)
    }

    /// Overlay with one lower layer and derived upper/work directories.
    pub fn overlay(lower: &Path, dirs: &OverlayDirs, destination: &str) -> Self {
        Self {
            destination: destination.to_string(),
            mount_type: "overlay".to_string(),
            source: "none".to_string(),
            options: vec![
                format!("lowerdir={}", lower.to_string_lossy()),
                format!("upperdir={}", dirs.upper.to_string_lossy()),
                format!("workdir={}", dirs.work.to_string_lossy()),
            ],
        }
    }

    /// Fresh writable tmpfs.
    pub fn tmpfs(destination: &str) -> Self {
        Self::new(destination, "tmpfs", "tmpfs", &["nosuid", "nodev", "mode=1777"])
    }
}

/// OCI Linux-specific config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Linux {
    pub uid_mappings: Vec<IdMapping>,
    pub gid_mappings: Vec<IdMapping>,
    pub namespaces: Vec<Namespace>,
    pub masked_paths: Vec<String>,
    pub readonly_paths: Vec<String>,
}

/// OCI user namespace ID mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMapping {
    #[serde(rename = "containerID")]
    pub container_id: u32,
    #[serde(rename = "hostID")]
    pub host_id: u32,
    pub size: u32,
}

/// OCI namespace config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    #[serde(rename = "type")]
    pub ns_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Namespace {
    fn new(ns_type: &str) -> Self {
        Self {
            ns_type: ns_type.to_string(),
            path: None,
        }
    }
}

// =============================================================================
// Template
// =============================================================================

impl RuntimeSpec {
    /// The static base document every job spec starts from.
    ///
    /// Root only inside a user namespace (container 0 → host 1000), a
    /// minimal capability set, `noNewPrivileges`, and no network namespace.
    pub fn base() -> Self {
        let root_mapping = IdMapping {
            container_id: 0,
            host_id: MAPPED_HOST_ID,
            size: 1,
        };
        Self {
            oci_version: OCI_RUNTIME_SPEC_VERSION.to_string(),
            process: Process {
                terminal: true,
                user: User { uid: 0, gid: 0 },
                args: Vec::new(),
                env: vec![DEFAULT_PATH_ENV.to_string()],
                cwd: "/".to_string(),
                capabilities: Capabilities::uniform(DEFAULT_CAPABILITIES),
                rlimits: vec![Rlimit {
                    limit_type: "RLIMIT_NOFILE".to_string(),
                    hard: DEFAULT_NOFILE_LIMIT,
                    soft: DEFAULT_NOFILE_LIMIT,
                }],
                no_new_privileges: true,
            },
            root: Root {
                path: DEFAULT_ROOTFS_PATH.to_string(),
                readonly: true,
            },
            hostname: DEFAULT_HOSTNAME.to_string(),
            mounts: Vec::new(),
            linux: Linux {
                uid_mappings: vec![root_mapping.clone()],
                gid_mappings: vec![root_mapping],
                namespaces: ["pid", "ipc", "uts", "mount", "user"]
                    .into_iter()
                    .map(Namespace::new)
                    .collect(),
                masked_paths: MASKED_PATHS.iter().map(|p| p.to_string()).collect(),
                readonly_paths: READONLY_PATHS.iter().map(|p| p.to_string()).collect(),
            },
        }
    }
}

impl Default for RuntimeSpec {
    fn default() -> Self {
        Self::base()
    }
}

/// Virtual filesystems every job gets, in mount order.
///
/// User mounts may never target these destinations or anything below
/// `/proc`, `/dev` or `/sys`.
pub fn essential_mounts() -> Vec<Mount> {
    vec![
        Mount::new("/proc", "proc", "proc", &[]),
        Mount::new(
            "/dev",
            "tmpfs",
            "tmpfs",
            &["nosuid", "strictatime", "mode=755", "size=65536k"],
        ),
        Mount::new(
            "/dev/pts",
            "devpts",
            "devpts",
            &["nosuid", "noexec", "newinstance", "ptmxmode=0666", "mode=0620"],
        ),
        Mount::new(
            "/dev/shm",
            "tmpfs",
            "shm",
            &["nosuid", "noexec", "nodev", "mode=1777", "size=65536k"],
        ),
        Mount::new("/dev/mqueue", "mqueue", "mqueue", &["nosuid", "noexec", "nodev"]),
        Mount::new(
            "/sys",
            "none",
            "/sys",
            &["rbind", "nosuid", "noexec", "nodev", "ro"],
        ),
    ]
}

// =============================================================================
// Patching
// =============================================================================

/// Per-job values applied on top of a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecPatch {
    /// Replaces `process.args`.
    pub args: Vec<String>,
    /// Replaces `process.cwd`.
    pub cwd: String,
    /// Replaces `mounts`.
    pub mounts: Vec<Mount>,
    /// Replaces `root.readonly`.
    pub root_readonly: bool,
    /// `KEY=VALUE` entries; a key already in the template is overridden.
    pub env: Vec<String>,
    /// Replaces `hostname` when set.
    pub hostname: Option<String>,
}

impl RuntimeSpec {
    /// Returns a copy of this template with `patch` applied.
    pub fn patched(&self, patch: SpecPatch) -> Self {
        let mut spec = self.clone();
        spec.process.args = patch.args;
        spec.process.cwd = patch.cwd;
        spec.mounts = patch.mounts;
        spec.root.readonly = patch.root_readonly;
        for entry in patch.env {
            merge_env(&mut spec.process.env, entry);
        }
        if let Some(hostname) = patch.hostname {
            spec.hostname = hostname;
        }
        spec
    }

    /// Returns the mount at `destination`, if any.
    pub fn mount(&self, destination: &str) -> Option<&Mount> {
        self.mounts.iter().find(|m| m.destination == destination)
    }
}

fn merge_env(env: &mut Vec<String>, entry: String) {
    let key = entry.split('=').next().unwrap_or_default();
    match env
        .iter_mut()
        .find(|existing| existing.split('=').next() == Some(key))
    {
        Some(existing) => *existing = entry,
        None => env.push(entry),
    }
}

// =============================================================================
// Emission
// =============================================================================

impl RuntimeSpec {
    /// Serializes to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Writes the document as pretty JSON to `sink`.
    pub fn write_to<W: Write>(&self, mut sink: W) -> Result<()> {
        serde_json::to_writer_pretty(&mut sink, self)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        sink.write_all(b"\n")?;
        sink.flush()?;
        Ok(())
    }

    /// Writes `config.json` into `bundle_dir`, creating the directory.
    pub fn write_bundle(&self, bundle_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(bundle_dir)?;
        let config_path = bundle_dir.join(BUNDLE_CONFIG_FILE);
        let file = fs::File::create(&config_path)?;
        self.write_to(std::io::BufWriter::new(file))?;
        info!("Wrote runtime spec: {}", config_path.display());
        Ok(config_path)
    }

    /// Reads a previously written `config.json`.
    pub fn read_bundle(bundle_dir: &Path) -> Result<Self> {
        let content = fs::read_to_string(bundle_dir.join(BUNDLE_CONFIG_FILE))?;
        serde_json::from_str(&content).map_err(|e| Error::Serialization(e.to_string()))
    }
}
