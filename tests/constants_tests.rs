//! Tests for constants module.
//!
//! Validates that security-critical constants have expected values and
//! that job name validation bounds the derived overlay paths.

use mountforge::*;

// =============================================================================
// Path Resolution Tests
// =============================================================================

#[test]
fn test_symlink_hop_limit_reasonable() {
    // Deep but legitimate link chains (alternatives, usrmerge) must resolve.
    assert!(MAX_SYMLINK_HOPS >= 40, "hop limit below the kernel's own");
    assert!(MAX_SYMLINK_HOPS <= 1024, "hop limit too permissive for loops");
}

#[test]
fn test_reserved_prefixes_cover_essentials() {
    for mount in essential_mounts() {
        assert!(
            RESERVED_DESTINATION_PREFIXES
                .iter()
                .any(|p| mount.destination == *p || mount.destination.starts_with(&format!("{}/", p))),
            "{} is not covered by a reserved prefix",
            mount.destination
        );
    }
}

// =============================================================================
// Overlay Storage Tests
// =============================================================================

#[test]
fn test_layer_and_work_dirs_distinct() {
    assert_ne!(OVERLAY_LAYER_DIR, OVERLAY_WORK_DIR);
    assert!(!OVERLAY_LAYER_DIR.contains('/'));
    assert!(!OVERLAY_WORK_DIR.contains('/'));
}

#[test]
fn test_job_name_limit_fits_name_max() {
    // Worst case every byte is percent-encoded.
    assert!(
        MAX_JOB_NAME_LEN * 3 <= MAX_PATH_SEGMENT_LEN,
        "escaped job name exceeds NAME_MAX"
    );
}

#[test]
fn test_lowerdir_separators_forbidden() {
    for c in [',', ':'] {
        assert!(
            OVERLAY_LOWERDIR_FORBIDDEN.contains(&c),
            "{:?} must not reach a lowerdir= value",
            c
        );
    }
}

// =============================================================================
// Job Name Validation Tests
// =============================================================================

#[test]
fn test_validate_job_name_valid() {
    assert!(validate_job_name("job1").is_ok());
    assert!(validate_job_name("a/b").is_ok(), "slashes are escaped, not rejected");
    assert!(validate_job_name(&"x".repeat(MAX_JOB_NAME_LEN)).is_ok());
}

#[test]
fn test_validate_job_name_empty() {
    assert!(validate_job_name("").is_err());
}

#[test]
fn test_validate_job_name_too_long() {
    assert!(validate_job_name(&"x".repeat(MAX_JOB_NAME_LEN + 1)).is_err());
}

#[test]
fn test_validate_job_name_nul() {
    assert!(validate_job_name("job\0").is_err());
}

// =============================================================================
// Template Tests
// =============================================================================

#[test]
fn test_default_capabilities_minimal() {
    assert!(DEFAULT_CAPABILITIES.len() <= 5);
    assert!(!DEFAULT_CAPABILITIES.contains(&"CAP_SYS_ADMIN"));
}

#[test]
fn test_path_env_is_key_value() {
    assert!(DEFAULT_PATH_ENV.starts_with("PATH="));
}
