//! # Mount Composition Constants
//!
//! Fixed values shared by the path guard, the overlay deriver, and the
//! runtime-spec template. These are the **single source of truth** for
//! anything that would otherwise be a magic string in a mount option.
//!
//! ## Cross-References
//!
//! - [`crate::paths`]: Uses the symlink hop limit
//! - [`crate::overlay`]: Uses the layer directory names
//! - [`crate::intent`]: Uses the reserved destination prefixes
//! - [`crate::bundle`]: Uses the template identifiers and versions

// =============================================================================
// Path Resolution
// =============================================================================

/// Maximum number of symlinks followed while resolving one destination.
///
/// **Security**: A symlink loop inside an untrusted rootfs must not hang
/// composition. Exceeding the limit is reported as a path escape.
///
/// **Rationale**: Matches the limit used by common secure-join
/// implementations; the kernel itself gives up at 40 per lookup.
pub const MAX_SYMLINK_HOPS: usize = 255;

/// Destination prefixes the engine owns.
///
/// **Security**: The essential virtual filesystems are mounted here in a
/// fixed order. A user mount at or below one of these would either be
/// shadowed or would shadow kernel interfaces, so they are rejected.
pub const RESERVED_DESTINATION_PREFIXES: &[&str] = &["/proc", "/dev", "/sys"];

// =============================================================================
// Overlay Storage
// =============================================================================
//
// Layout under the overlay base directory:
//   <base>/<escaped job>/<escaped destination>/layer
//   <base>/<escaped job>/<escaped destination>/work
// =============================================================================

/// Directory name of an overlay's upper (writable) layer.
pub const OVERLAY_LAYER_DIR: &str = "layer";

/// Directory name of an overlay's work directory.
pub const OVERLAY_WORK_DIR: &str = "work";

/// Longest file name most Linux filesystems accept (`NAME_MAX`).
///
/// Escaped job names and escaped destinations each become one path
/// segment of overlay storage and must fit.
pub const MAX_PATH_SEGMENT_LEN: usize = 255;

/// Characters overlayfs interprets inside a `lowerdir=` value.
///
/// **Security**: `,` starts another mount option and `:` stacks another
/// lower layer, so a source containing either could splice arbitrary host
/// directories or options into the mount. `\` is the escape character.
pub const OVERLAY_LOWERDIR_FORBIDDEN: &[char] = &[',', ':', '\\'];

/// Environment variable that overrides the overlay base directory.
pub const OVERLAY_DIR_ENV: &str = "MOUNTFORGE_OVERLAY_DIR";

/// Overlay base directory below the user's home directory.
pub const HOME_OVERLAY_SUBDIR: &str = ".mountforge/overlay";

/// Overlay base directory when no home directory is known.
pub const SYSTEM_OVERLAY_DIR: &str = "/var/lib/mountforge/overlay";

// =============================================================================
// OCI Runtime Spec
// =============================================================================

/// OCI Runtime Spec version written into generated `config.json`.
///
/// See: <https://github.com/opencontainers/runtime-spec/releases>
pub const OCI_RUNTIME_SPEC_VERSION: &str = "1.0.2-dev";

/// File name of the runtime config inside a bundle directory.
pub const BUNDLE_CONFIG_FILE: &str = "config.json";

/// Rootfs path (relative to the bundle) used by the base template.
pub const DEFAULT_ROOTFS_PATH: &str = "rootfs";

/// Hostname used by the base template.
pub const DEFAULT_HOSTNAME: &str = "runc";

/// Default `PATH` for the container process.
pub const DEFAULT_PATH_ENV: &str =
    "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Host UID/GID that container ID 0 is mapped to.
///
/// **Security**: The job runs as root only inside its user namespace.
pub const MAPPED_HOST_ID: u32 = 1000;

/// Soft and hard `RLIMIT_NOFILE` for the container process.
pub const DEFAULT_NOFILE_LIMIT: u64 = 1024;

/// Capabilities kept in every capability set of the base template.
pub const DEFAULT_CAPABILITIES: &[&str] = &["CAP_AUDIT_WRITE", "CAP_KILL", "CAP_NET_BIND_SERVICE"];

/// Paths masked from the container by the base template.
pub const MASKED_PATHS: &[&str] = &[
    "/proc/acpi",
    "/proc/asound",
    "/proc/kcore",
    "/proc/keys",
    "/proc/latency_stats",
    "/proc/timer_list",
    "/proc/timer_stats",
    "/proc/sched_debug",
    "/sys/firmware",
    "/proc/scsi",
];

/// Paths made read-only inside the container by the base template.
pub const READONLY_PATHS: &[&str] = &[
    "/proc/bus",
    "/proc/fs",
    "/proc/irq",
    "/proc/sys",
    "/proc/sysrq-trigger",
];

// =============================================================================
// Job Name Validation
// =============================================================================

/// Maximum job name length in bytes.
///
/// **Rationale**: The escaped job name becomes a single path segment, and
/// percent-encoding can triple its length; see [`MAX_PATH_SEGMENT_LEN`].
pub const MAX_JOB_NAME_LEN: usize = MAX_PATH_SEGMENT_LEN / 3;

/// Validates a job name before it is used to namespace overlay storage.
///
/// # Returns
///
/// `Ok(())` if valid, `Err(reason)` with a description of the failure.
#[inline]
#[must_use = "validation result must be checked before deriving overlay paths"]
pub fn validate_job_name(name: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() {
        return Err("job name cannot be empty");
    }
    if name.len() > MAX_JOB_NAME_LEN {
        return Err("job name exceeds maximum length");
    }
    if name.contains('\0') {
        return Err("job name contains a NUL byte");
    }
    Ok(())
}
