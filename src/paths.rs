//! # Destination Paths
//!
//! Two layers of defense for mount destinations:
//!
//! - [`clean_destination`] is a pure string check. It normalizes
//!   `//a/./b/` to `/a/b` and rejects any `..` component, so comparisons,
//!   duplicate detection and sorting all work on one canonical spelling.
//! - [`secure_join`] resolves a destination against a real root directory
//!   on disk, following symlinks the way a later `chroot` would see them.
//!   It runs immediately before each mount syscall, because a symlink in
//!   the target tree can change between validation and use.
//!
//! ## Symlink Semantics
//!
//! ```text
//! root/
//! ├── bin  -> usr/bin        relative: resolved from the link's directory
//! ├── etc2 -> /etc           absolute: restarts at root (root/etc)
//! └── out  -> ../../host     climbs above root: PathEscape
//! ```
//!
//! Components that do not exist yet are appended lexically; nothing below
//! a missing directory can be a symlink.

use crate::constants::MAX_SYMLINK_HOPS;
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Normalizes an absolute, slash-separated destination.
///
/// # Errors
///
/// - [`Error::InvalidDestination`] if the path is empty, relative, or
///   contains a NUL byte.
/// - [`Error::PathEscape`] if any component is `..`.
pub fn clean_destination(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Err(Error::InvalidDestination {
            destination: raw.to_string(),
            reason: "destination cannot be empty".to_string(),
        });
    }
    if !raw.starts_with('/') {
        return Err(Error::InvalidDestination {
            destination: raw.to_string(),
            reason: "destination must be absolute".to_string(),
        });
    }
    if raw.contains('\0') {
        return Err(Error::InvalidDestination {
            destination: raw.to_string(),
            reason: "destination contains a NUL byte".to_string(),
        });
    }

    let mut parts = Vec::new();
    for part in raw.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                return Err(Error::PathEscape {
                    path: PathBuf::from(raw),
                    root: PathBuf::from("/"),
                });
            }
            other => parts.push(other),
        }
    }

    Ok(format!("/{}", parts.join("/")))
}

/// Returns true if `path` equals `prefix` or lies below it.
///
/// Both arguments must already be cleaned.
pub fn is_within(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Resolves `dst` inside `root`, guaranteeing the result cannot leave it.
///
/// `root` is trusted and is canonicalized first; `dst` is untrusted and may
/// be absolute (interpreted relative to `root`) or relative.
///
/// # Errors
///
/// - [`Error::PathEscape`] if `dst` has a `..` component, if a symlink on
///   the way climbs above `root`, or if more than
///   [`MAX_SYMLINK_HOPS`] symlinks are followed.
/// - [`Error::DestinationPrepFailed`] if `root` or an intermediate
///   component cannot be inspected.
pub fn secure_join(root: &Path, dst: &Path) -> Result<PathBuf> {
    let root = fs::canonicalize(root).map_err(|e| Error::DestinationPrepFailed {
        path: root.to_path_buf(),
        reason: format!("cannot resolve root: {}", e),
    })?;

    let mut pending: VecDeque<OsString> = VecDeque::new();
    for component in dst.components() {
        match component {
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                return Err(Error::PathEscape {
                    path: dst.to_path_buf(),
                    root,
                });
            }
            Component::Normal(part) => pending.push_back(part.to_os_string()),
        }
    }

    let mut resolved = root.clone();
    let mut hops = 0usize;
    let mut on_disk = true;

    while let Some(part) = pending.pop_front() {
        if part == OsStr::new("..") {
            // Only symlink targets feed `..` back into the queue.
            if resolved == root {
                return Err(Error::PathEscape {
                    path: dst.to_path_buf(),
                    root,
                });
            }
            resolved.pop();
            continue;
        }

        let candidate = resolved.join(&part);
        if !on_disk {
            resolved = candidate;
            continue;
        }

        match fs::symlink_metadata(&candidate) {
            Ok(meta) if meta.file_type().is_symlink() => {
                hops += 1;
                if hops > MAX_SYMLINK_HOPS {
                    return Err(Error::PathEscape {
                        path: dst.to_path_buf(),
                        root,
                    });
                }
                let target = fs::read_link(&candidate).map_err(|e| Error::DestinationPrepFailed {
                    path: candidate.clone(),
                    reason: format!("cannot read symlink: {}", e),
                })?;
                if target.is_absolute() {
                    resolved = root.clone();
                }
                let mut expanded = symlink_components(&target);
                expanded.extend(pending.drain(..));
                pending = expanded;
            }
            Ok(_) => resolved = candidate,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                on_disk = false;
                resolved = candidate;
            }
            Err(e) => {
                return Err(Error::DestinationPrepFailed {
                    path: candidate,
                    reason: e.to_string(),
                });
            }
        }
    }

    if !resolved.starts_with(&root) {
        return Err(Error::PathEscape {
            path: dst.to_path_buf(),
            root,
        });
    }
    Ok(resolved)
}

/// Splits a symlink target into components, keeping `..` for the resolver.
fn symlink_components(target: &Path) -> VecDeque<OsString> {
    target
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_os_string()),
            Component::ParentDir => Some(OsString::from("..")),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => None,
        })
        .collect()
}
