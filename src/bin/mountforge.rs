//! mountforge - runtime spec emitter
//!
//! Reads an execution spec (JSON) and writes the OCI runtime `config.json`
//! a low-level runtime needs to run it.
//!
//! ## Usage
//!
//! ```sh
//! mountforge spec job.json                      # config.json to stdout
//! mountforge spec job.json --bundle ./bundle    # write ./bundle/config.json
//! mountforge spec job.json --prepare-overlays   # also create overlay dirs
//! mountforge version
//! ```
//!
//! The execution spec looks like:
//!
//! ```json
//! {
//!   "name": "job1",
//!   "command": ["ls"],
//!   "workingDir": "/",
//!   "mounts": [{ "source": "/host/data", "destination": "/", "mode": "overlay" }]
//! }
//! ```
//!
//! Set `RUST_LOG=debug` for per-mount logging on stderr.

use anyhow::{Context, Result, bail};
use mountforge::{EngineConfig, ExecutionSpec, SpecAssembler};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

// =============================================================================
// CLI Parsing
// =============================================================================

#[derive(Debug)]
enum Command {
    Spec {
        input: PathBuf,
        bundle: Option<PathBuf>,
        overlay_dir: Option<PathBuf>,
        prepare_overlays: bool,
    },
    Version,
    Help,
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some(first) = args.get(1) else {
        return Ok(Command::Help);
    };

    match first.as_str() {
        "spec" => {
            let Some(input) = args.get(2) else {
                bail!("spec requires <execution-spec.json>");
            };
            let mut bundle = None;
            let mut overlay_dir = None;
            let mut prepare_overlays = false;
            let mut i = 3;
            while i < args.len() {
                match args[i].as_str() {
                    "--bundle" | "-b" => {
                        let value = args.get(i + 1).context("--bundle requires a path")?;
                        bundle = Some(PathBuf::from(value));
                        i += 2;
                    }
                    "--overlay-dir" => {
                        let value = args.get(i + 1).context("--overlay-dir requires a path")?;
                        overlay_dir = Some(PathBuf::from(value));
                        i += 2;
                    }
                    "--prepare-overlays" => {
                        prepare_overlays = true;
                        i += 1;
                    }
                    other => bail!("unknown option: {}", other),
                }
            }
            Ok(Command::Spec {
                input: PathBuf::from(input),
                bundle,
                overlay_dir,
                prepare_overlays,
            })
        }
        "version" | "--version" | "-v" => Ok(Command::Version),
        "help" | "--help" | "-h" => Ok(Command::Help),
        unknown => bail!("unknown command: {}", unknown),
    }
}

// =============================================================================
// Command Implementations
// =============================================================================

fn cmd_spec(
    input: PathBuf,
    bundle: Option<PathBuf>,
    overlay_dir: Option<PathBuf>,
    prepare_overlays: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(&input)
        .with_context(|| format!("cannot read execution spec {}", input.display()))?;
    let spec = ExecutionSpec::from_json(&content)
        .with_context(|| format!("invalid execution spec {}", input.display()))?;

    let config = match overlay_dir {
        Some(dir) => EngineConfig::new(dir),
        None => EngineConfig::from_env(dirs::home_dir().as_deref()),
    };
    let assembler = SpecAssembler::from_config(&config);
    let runtime_spec = assembler.assemble(&spec)?;

    if prepare_overlays {
        let prepared = assembler.layout().prepare(&spec)?;
        info!(job = %spec.name, overlays = prepared.len(), "overlay directories created");
    }

    match bundle {
        Some(dir) => {
            let path = runtime_spec.write_bundle(&dir)?;
            eprintln!("Wrote {}", path.display());
        }
        None => runtime_spec.write_to(std::io::stdout().lock())?,
    }
    Ok(())
}

fn cmd_version() {
    println!("mountforge {}", env!("CARGO_PKG_VERSION"));
    println!("OCI runtime spec {}", mountforge::OCI_RUNTIME_SPEC_VERSION);
}

fn cmd_help() {
    eprintln!(
        r#"mountforge - OCI runtime spec emitter

USAGE:
    mountforge <command> [options]

COMMANDS:
    spec <execution-spec.json>   Assemble a runtime spec
        -b, --bundle <dir>       Write <dir>/config.json instead of stdout
        --overlay-dir <dir>      Overlay storage base (default: $MOUNTFORGE_OVERLAY_DIR,
                                 then ~/.mountforge/overlay)
        --prepare-overlays       Create overlay layer/work directories
    version                      Show version information
    help                         Show this help message
"#
    );
}

// =============================================================================
// Main
// =============================================================================

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Failed to set tracing subscriber");
    }
}

fn main() -> ExitCode {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let result = match parse_args(&args) {
        Ok(Command::Spec {
            input,
            bundle,
            overlay_dir,
            prepare_overlays,
        }) => cmd_spec(input, bundle, overlay_dir, prepare_overlays),
        Ok(Command::Version) => {
            cmd_version();
            Ok(())
        }
        Ok(Command::Help) => {
            cmd_help();
            Ok(())
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            cmd_help();
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
