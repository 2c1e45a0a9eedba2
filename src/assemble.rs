//! Runtime spec assembly.
//!
//! Turns an [`ExecutionSpec`] into a complete [`RuntimeSpec`]:
//!
//! ```text
//! mounts = [ root (if any) ]
//!        + [ /proc, /dev, /dev/pts, /dev/shm, /dev/mqueue, /sys ]
//!        + [ job mounts, sorted by cleaned destination ]
//! ```
//!
//! Runtimes apply mounts in list order, so job mounts are sorted the same
//! way physical composition sorts them: a parent always precedes anything
//! nested under it.

use crate::bundle::{Mount, RuntimeSpec, SpecPatch, essential_mounts};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::intent::{ExecutionSpec, MountIntent, MountMode};
use crate::overlay::OverlayLayout;
use crate::root::resolve_root;
use tracing::debug;

/// Builds runtime specs from a fixed template and overlay layout.
#[derive(Debug, Clone)]
pub struct SpecAssembler {
    template: RuntimeSpec,
    layout: OverlayLayout,
}

impl SpecAssembler {
    /// Creates an assembler over the base template.
    pub fn new(layout: OverlayLayout) -> Self {
        Self::with_template(RuntimeSpec::base(), layout)
    }

    /// Creates an assembler over a custom template.
    pub fn with_template(template: RuntimeSpec, layout: OverlayLayout) -> Self {
        Self { template, layout }
    }

    /// Creates an assembler from engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.overlay_layout())
    }

    /// Returns the template.
    pub fn template(&self) -> &RuntimeSpec {
        &self.template
    }

    /// Returns the overlay layout.
    pub fn layout(&self) -> &OverlayLayout {
        &self.layout
    }

    /// Assembles the runtime spec for `spec`.
    ///
    /// The whole spec is validated first; nothing is read from or written
    /// to disk.
    pub fn assemble(&self, spec: &ExecutionSpec) -> Result<RuntimeSpec> {
        assemble(&self.template, spec, &self.layout)
    }
}

/// Assembles a runtime spec from a template, a job, and an overlay layout.
///
/// # Errors
///
/// Any validation error of [`ExecutionSpec::validate`]; these are
/// configuration errors and are never skipped over.
pub fn assemble(
    template: &RuntimeSpec,
    spec: &ExecutionSpec,
    layout: &OverlayLayout,
) -> Result<RuntimeSpec> {
    spec.validate()?;

    let root = resolve_root(spec.root_intent(), &spec.name, layout);

    let mut mounts = Vec::new();
    mounts.extend(root.mount());
    mounts.extend(essential_mounts());
    for (destination, intent) in spec.non_root_mounts()? {
        mounts.push(mount_for(&spec.name, &destination, intent, layout));
    }

    debug!(
        job = %spec.name,
        mounts = mounts.len(),
        root_readonly = root.readonly,
        "assembled runtime spec"
    );

    Ok(template.patched(SpecPatch {
        args: spec.command.clone(),
        cwd: spec.working_dir.clone(),
        mounts,
        root_readonly: root.readonly,
        env: spec.env.clone(),
        hostname: spec.hostname.clone(),
    }))
}

fn mount_for(job: &str, destination: &str, intent: &MountIntent, layout: &OverlayLayout) -> Mount {
    match intent.mode {
        MountMode::ReadOnly => Mount::bind(&intent.source, destination, true),
        MountMode::Overlay => {
            Mount::overlay(&intent.source, &layout.dirs(job, destination), destination)
        }
        MountMode::Writable => Mount::bind(&intent.source, destination, false),
        MountMode::Tmp => Mount::tmpfs(destination),
    }
}
