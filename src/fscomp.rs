//! # Filesystem Composition
//!
//! Builds a composed filesystem tree out of bind, overlay and tmpfs mounts
//! without modifying any source filesystem. Asking for "the host tree at
//! `/` and something else at `/foo`" takes many kernel calls in the right
//! order (create mount points, derive overlay storage, bind, remount
//! read-only); [`Composer::compose`] does all of it from a declarative list.
//!
//! ## Ordering
//!
//! Entries are applied in ascending order of cleaned destination, so a
//! parent is always the intended filesystem before anything is bound
//! beneath it. Mount points are created without parents on purpose: a
//! missing parent means the set is ordered or shaped wrong.
//!
//! ## Teardown
//!
//! Every successful mount pushes one [`Teardown`] onto a [`Decomposer`].
//! Decomposing pops them last-mounted-first, keeps going past failures and
//! reports every failure. When composition fails midway the caller still
//! gets the decomposer for everything mounted so far, inside a
//! [`CompositionError`].
//!
//! ```text
//! compose:    /  →  /a  →  /a/b  →  /c   (fails)
//! decompose:            /a/b  →  /a  →  /
//! ```

use crate::error::{Error, Result};
use crate::intent::{MountMode, check_source};
use crate::mounter::Mounter;
use crate::overlay::{OverlayLayout, check_destination_segment};
use crate::paths::{clean_destination, secure_join};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

// =============================================================================
// Composition Entries
// =============================================================================

/// One mount of a composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionEntry {
    /// Absolute host path. Ignored for [`MountMode::Tmp`].
    pub source: PathBuf,
    /// Absolute path, relativized to the composition root.
    pub destination: String,
    /// Desired effect.
    pub mode: MountMode,
}

impl CompositionEntry {
    /// Creates a composition entry.
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<String>, mode: MountMode) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            mode,
        }
    }
}

// =============================================================================
// Teardown
// =============================================================================

/// One recorded undo step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Teardown {
    /// Unmount the given absolute path.
    Unmount(PathBuf),
}

impl Teardown {
    fn run(&self, mounter: &dyn Mounter) -> Result<()> {
        match self {
            Self::Unmount(target) => {
                debug!(mount_point = %target.display(), "unmounting");
                mounter.unmount(target).map_err(|e| Error::UnmountFailed {
                    target: target.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// Ordered stack of teardown steps for a composition.
pub struct Decomposer {
    mounter: Arc<dyn Mounter>,
    stack: Vec<Teardown>,
}

impl Decomposer {
    /// Creates an empty decomposer.
    pub fn new(mounter: Arc<dyn Mounter>) -> Self {
        Self {
            mounter,
            stack: Vec::new(),
        }
    }

    /// Records a teardown step. Steps run in reverse push order.
    pub fn push(&mut self, step: Teardown) {
        self.stack.push(step);
    }

    /// Moves every step of `other` on top of this stack.
    pub fn absorb(&mut self, mut other: Decomposer) {
        self.stack.append(&mut other.stack);
    }

    /// Returns the number of pending steps.
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Returns true if there is nothing to undo.
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Returns pending steps in the order they will run.
    pub fn pending(&self) -> impl Iterator<Item = &Teardown> {
        self.stack.iter().rev()
    }

    /// Runs every step, last pushed first.
    ///
    /// A failing step does not stop the ones after it.
    ///
    /// # Errors
    ///
    /// [`Error::RollbackIncomplete`] with every failure, in the order they
    /// happened. Mounts named there are still live; retrying or escalating
    /// is up to the caller.
    pub fn decompose(mut self) -> Result<()> {
        let stack = std::mem::take(&mut self.stack);
        let total = stack.len();
        let mut failures = Vec::new();
        for step in stack.iter().rev() {
            if let Err(e) = step.run(self.mounter.as_ref()) {
                warn!(error = %e, "teardown step failed");
                failures.push(e);
            }
        }
        if failures.is_empty() {
            debug!(steps = total, "decomposed");
            Ok(())
        } else {
            Err(Error::RollbackIncomplete(failures))
        }
    }
}

impl fmt::Debug for Decomposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decomposer")
            .field("stack", &self.stack)
            .finish_non_exhaustive()
    }
}

impl Drop for Decomposer {
    fn drop(&mut self) {
        if !self.stack.is_empty() {
            warn!(
                live_mounts = self.stack.len(),
                "decomposer dropped without decomposing; mounts left in place"
            );
        }
    }
}

// =============================================================================
// Composition Errors
// =============================================================================

/// A failed setup step together with the teardown for what did succeed.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct CompositionError {
    /// What went wrong.
    pub error: Error,
    /// Undo for everything mounted before the failure.
    pub decomposer: Decomposer,
}

impl CompositionError {
    fn new(error: Error, decomposer: Decomposer) -> Self {
        Self { error, decomposer }
    }

    /// Unwinds the partial setup and returns the original error.
    ///
    /// If unwinding also fails, both are reported together.
    pub fn rollback(self) -> Error {
        let Self { error, decomposer } = self;
        match decomposer.decompose() {
            Ok(()) => error,
            Err(Error::RollbackIncomplete(mut failures)) => {
                failures.insert(0, error);
                Error::RollbackIncomplete(failures)
            }
            Err(other) => other,
        }
    }
}

// =============================================================================
// Mount Materializer
// =============================================================================

/// Bind mounts `source` onto `destination` inside `dest_root`.
///
/// 1. `source` must exist (the final symlink is not followed).
/// 2. `destination` is resolved with [`secure_join`].
/// 3. A directory or file is created at the destination to match the
///    source's type; parents are never created.
/// 4. The bind is issued, then optionally remounted read-only.
///
/// If the read-only remount fails, the returned error still carries the
/// teardown for the bind that did happen.
pub fn bind(
    mounter: Arc<dyn Mounter>,
    source: &Path,
    destination: &Path,
    dest_root: &Path,
    readonly: bool,
) -> std::result::Result<Decomposer, CompositionError> {
    let mut decomposer = Decomposer::new(Arc::clone(&mounter));

    let source_meta = match fs::symlink_metadata(source) {
        Ok(meta) => meta,
        Err(e) => {
            return Err(CompositionError::new(
                Error::SourceNotFound {
                    path: source.to_path_buf(),
                    reason: e.to_string(),
                },
                decomposer,
            ));
        }
    };

    let target = match secure_join(dest_root, destination) {
        Ok(target) => target,
        Err(e) => return Err(CompositionError::new(e, decomposer)),
    };

    if let Err(e) = make_mount_point(&target, source_meta.is_dir()) {
        return Err(CompositionError::new(e, decomposer));
    }

    debug!(source = %source.display(), mount_point = %target.display(), readonly, "bind mounting");
    if let Err(e) = mounter.bind(source, &target) {
        return Err(CompositionError::new(
            mount_failed(source, &target, e),
            decomposer,
        ));
    }
    decomposer.push(Teardown::Unmount(target.clone()));

    if readonly {
        if let Err(e) = mounter.remount_readonly(source, &target) {
            return Err(CompositionError::new(
                mount_failed(source, &target, e),
                decomposer,
            ));
        }
    }

    Ok(decomposer)
}

/// Ensures a node of the right type exists to mount over.
fn make_mount_point(path: &Path, dir: bool) -> Result<()> {
    let prep_failed = |e: io::Error| Error::DestinationPrepFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    match fs::symlink_metadata(path) {
        Ok(_) => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(prep_failed(e)),
    }

    let created = if dir {
        fs::create_dir(path)
    } else {
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map(drop)
    };
    match created {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(prep_failed(e)),
    }
}

fn mount_failed(source: &Path, target: &Path, e: io::Error) -> Error {
    Error::MountSyscallFailed {
        from: source.display().to_string(),
        target: target.to_path_buf(),
        reason: e.to_string(),
    }
}

// =============================================================================
// Composition Sequencer
// =============================================================================

/// Applies composition entries to a root directory.
pub struct Composer {
    mounter: Arc<dyn Mounter>,
    overlays: Option<(OverlayLayout, String)>,
}

impl Composer {
    /// Creates a composer without overlay storage.
    ///
    /// Entries in [`MountMode::Overlay`] fail with
    /// [`Error::DestinationPrepFailed`] until [`Composer::with_overlays`]
    /// is used.
    pub fn new(mounter: Arc<dyn Mounter>) -> Self {
        Self {
            mounter,
            overlays: None,
        }
    }

    /// Enables overlay entries, storing their layers under `layout` in the
    /// namespace of `job`.
    pub fn with_overlays(mut self, layout: OverlayLayout, job: impl Into<String>) -> Self {
        self.overlays = Some((layout, job.into()));
        self
    }

    /// Sorts entries into mount order, validating the whole set first.
    ///
    /// # Errors
    ///
    /// - Destination errors from [`clean_destination`].
    /// - [`Error::DuplicateDestination`].
    /// - [`Error::SpecBuildFailed`] for a missing or relative source, or an
    ///   overlay source that would inject `lowerdir=` separators or options.
    /// - [`Error::InvalidDestination`] for an overlay destination too long
    ///   to name its storage directory.
    pub fn plan(entries: &[CompositionEntry]) -> Result<Vec<(String, CompositionEntry)>> {
        let mut planned = Vec::with_capacity(entries.len());
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in entries {
            let destination = clean_destination(&entry.destination)?;
            let overlay = entry.mode == MountMode::Overlay;
            check_source(&entry.source, entry.mode, overlay)?;
            if overlay {
                check_destination_segment(&destination)?;
            }
            if !seen.insert(destination.clone()) {
                return Err(Error::DuplicateDestination(destination));
            }
            planned.push((destination, entry.clone()));
        }
        planned.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(planned)
    }

    /// Mounts every entry under `root`, shallowest destination first.
    ///
    /// Stops at the first failure; the error carries the decomposer for
    /// everything mounted before it.
    pub fn compose(
        &self,
        root: &Path,
        entries: &[CompositionEntry],
    ) -> std::result::Result<Decomposer, CompositionError> {
        let mut decomposer = Decomposer::new(Arc::clone(&self.mounter));

        let planned = match Self::plan(entries) {
            Ok(planned) => planned,
            Err(e) => return Err(CompositionError::new(e, decomposer)),
        };

        for (destination, entry) in &planned {
            match self.apply(root, destination, entry) {
                Ok(step) => decomposer.absorb(step),
                Err(CompositionError {
                    error,
                    decomposer: partial,
                }) => {
                    decomposer.absorb(partial);
                    warn!(
                        root = %root.display(),
                        destination = %destination,
                        error = %error,
                        mounted = decomposer.len(),
                        "composition failed"
                    );
                    return Err(CompositionError::new(error, decomposer));
                }
            }
        }

        info!(root = %root.display(), mounts = decomposer.len(), "composition complete");
        Ok(decomposer)
    }

    /// Like [`Composer::compose`], but unwinds on failure.
    pub fn compose_or_rollback(&self, root: &Path, entries: &[CompositionEntry]) -> Result<Decomposer> {
        self.compose(root, entries).map_err(CompositionError::rollback)
    }

    fn apply(
        &self,
        root: &Path,
        destination: &str,
        entry: &CompositionEntry,
    ) -> std::result::Result<Decomposer, CompositionError> {
        let dst = Path::new(destination);
        match entry.mode {
            MountMode::ReadOnly => bind(Arc::clone(&self.mounter), &entry.source, dst, root, true),
            MountMode::Writable => bind(Arc::clone(&self.mounter), &entry.source, dst, root, false),
            MountMode::Overlay => self.overlay(root, destination, entry),
            MountMode::Tmp => self.tmpfs(root, destination),
        }
    }

    fn overlay(
        &self,
        root: &Path,
        destination: &str,
        entry: &CompositionEntry,
    ) -> std::result::Result<Decomposer, CompositionError> {
        let decomposer = Decomposer::new(Arc::clone(&self.mounter));
        let Some((layout, job)) = &self.overlays else {
            return Err(CompositionError::new(
                Error::DestinationPrepFailed {
                    path: PathBuf::from(destination),
                    reason: "overlay entry requires overlay storage".to_string(),
                },
                decomposer,
            ));
        };

        let source_meta = match fs::metadata(&entry.source) {
            Ok(meta) if meta.is_dir() => meta,
            Ok(_) => {
                return Err(CompositionError::new(
                    Error::SourceNotFound {
                        path: entry.source.clone(),
                        reason: "overlay lower layer must be a directory".to_string(),
                    },
                    decomposer,
                ));
            }
            Err(e) => {
                return Err(CompositionError::new(
                    Error::SourceNotFound {
                        path: entry.source.clone(),
                        reason: e.to_string(),
                    },
                    decomposer,
                ));
            }
        };

        let prepared = secure_join(root, Path::new(destination))
            .and_then(|target| make_mount_point(&target, source_meta.is_dir()).map(|()| target))
            .and_then(|target| layout.create(job, destination).map(|dirs| (target, dirs)));
        let (target, dirs) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return Err(CompositionError::new(e, decomposer)),
        };

        debug!(lower = %entry.source.display(), mount_point = %target.display(), "overlay mounting");
        self.mount_then_record(decomposer, &target, &entry.source.display().to_string(), |m| {
            m.overlay(&entry.source, &dirs.upper, &dirs.work, &target)
        })
    }

    fn tmpfs(&self, root: &Path, destination: &str) -> std::result::Result<Decomposer, CompositionError> {
        let decomposer = Decomposer::new(Arc::clone(&self.mounter));
        let prepared = secure_join(root, Path::new(destination))
            .and_then(|target| make_mount_point(&target, true).map(|()| target));
        let target = match prepared {
            Ok(target) => target,
            Err(e) => return Err(CompositionError::new(e, decomposer)),
        };

        debug!(mount_point = %target.display(), "tmpfs mounting");
        self.mount_then_record(decomposer, &target, "tmpfs", |m| m.tmpfs(&target))
    }

    fn mount_then_record<F>(
        &self,
        mut decomposer: Decomposer,
        target: &Path,
        from: &str,
        mount: F,
    ) -> std::result::Result<Decomposer, CompositionError>
    where
        F: FnOnce(&dyn Mounter) -> io::Result<()>,
    {
        match mount(self.mounter.as_ref()) {
            Ok(()) => {
                decomposer.push(Teardown::Unmount(target.to_path_buf()));
                Ok(decomposer)
            }
            Err(e) => Err(CompositionError::new(
                Error::MountSyscallFailed {
                    from: from.to_string(),
                    target: target.to_path_buf(),
                    reason: e.to_string(),
                },
                decomposer,
            )),
        }
    }
}
