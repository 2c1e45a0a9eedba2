//! # mountforge
//!
//! **Mount Composition and OCI Runtime-Spec Generation for Hermetic Jobs**
//!
//! This crate prepares the filesystem side of a sandboxed job: it turns a
//! declarative list of mounts into either a runtime `config.json` or a
//! live, composed mount tree. It does not create namespaces, supervise
//! processes, or invoke the runtime.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                            mountforge                               │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │   ExecutionSpec { name, command, mounts, working_dir }              │
//! │        │ validate: unique / reserved / no `..`                      │
//! │        ▼                                                            │
//! │  ┌──────────────────────────────┐   ┌────────────────────────────┐  │
//! │  │ Spec Assembly                │   │ Filesystem Composition     │  │
//! │  │  resolve_root (5 cases)      │   │  Composer::compose         │  │
//! │  │  + essential mounts          │   │   sort by destination      │  │
//! │  │  + sorted job mounts         │   │   bind / overlay / tmpfs   │  │
//! │  │  → RuntimeSpec (config.json) │   │   → Decomposer (LIFO)      │  │
//! │  └──────────────┬───────────────┘   └──────────────┬─────────────┘  │
//! │                 │                                  │                │
//! │  ┌──────────────┴──────────────────────────────────┴─────────────┐  │
//! │  │ OverlayLayout: <base>/<job>/<destination>/{layer,work}        │  │
//! │  │ secure_join:   symlink-safe resolution inside a root          │  │
//! │  │ Mounter:       mount(2) / umount2(2) seam                     │  │
//! │  └───────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Safety Properties
//!
//! - **No escape**: destinations with `..` are rejected, and every mount
//!   point is resolved through [`paths::secure_join`] right before the
//!   syscall that uses it.
//! - **Validate first**: an illegal mount set (duplicates, reserved
//!   destinations) is rejected before any kernel mutation.
//! - **Always unwindable**: a failed composition returns the teardown for
//!   everything that did get mounted.
//!
//! # Example
//!
//! ```rust,ignore
//! use mountforge::{ExecutionSpec, MountIntent, MountMode, SpecAssembler, OverlayLayout};
//!
//! let spec = ExecutionSpec::new(
//!     "job1",
//!     vec!["ls".to_string()],
//!     vec![MountIntent::new("/host/data", "/", MountMode::Overlay)],
//!     "/",
//! )?;
//! let assembler = SpecAssembler::new(OverlayLayout::new("/var/wf/overlay"));
//! let runtime_spec = assembler.assemble(&spec)?;
//! runtime_spec.write_to(std::io::stdout())?;
//! ```

pub mod assemble;
pub mod bundle;
pub mod config;
pub mod constants;
pub mod error;
pub mod fscomp;
pub mod intent;
pub mod mounter;
pub mod overlay;
pub mod paths;
pub mod root;

// Re-exports
pub use assemble::{SpecAssembler, assemble};
pub use bundle::{Mount, RuntimeSpec, SpecPatch, essential_mounts};
pub use config::EngineConfig;
pub use constants::*;
pub use error::{Error, Result};
pub use fscomp::{CompositionEntry, CompositionError, Composer, Decomposer, Teardown, bind};
pub use intent::{ExecutionSpec, MountIntent, MountMode};
pub use mounter::{Mounter, SystemMounter};
pub use overlay::{OverlayDirs, OverlayLayout, escape_segment};
pub use paths::{clean_destination, secure_join};
pub use root::{RootPlan, RootStrategy, resolve_root};
