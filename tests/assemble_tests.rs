//! Tests for runtime spec assembly.
//!
//! Validates mount list shape, root handling, and per-job patching.

use mountforge::{
    Error, ExecutionSpec, MountIntent, MountMode, OverlayLayout, RuntimeSpec, SpecAssembler,
    essential_mounts,
};

fn assembler() -> SpecAssembler {
    SpecAssembler::new(OverlayLayout::new("/var/wf/overlay"))
}

fn job(mounts: Vec<MountIntent>) -> ExecutionSpec {
    ExecutionSpec::new("job1", vec!["ls".to_string()], mounts, "/").unwrap()
}

fn destinations(spec: &RuntimeSpec) -> Vec<&str> {
    spec.mounts.iter().map(|m| m.destination.as_str()).collect()
}

// =============================================================================
// Root Handling
// =============================================================================

#[test]
fn test_overlay_root_end_to_end() {
    let spec = job(vec![MountIntent::new("/host/data", "/", MountMode::Overlay)]);
    let runtime = assembler().assemble(&spec).unwrap();

    assert_eq!(runtime.mounts.len(), 7, "root + six essentials");
    let root = &runtime.mounts[0];
    assert_eq!(root.destination, "/");
    assert_eq!(root.mount_type, "overlay");
    assert_eq!(root.source, "none");
    assert_eq!(
        root.options,
        vec![
            "lowerdir=/host/data",
            "upperdir=/var/wf/overlay/job1/%2F/layer",
            "workdir=/var/wf/overlay/job1/%2F/work",
        ]
    );
    assert_eq!(&runtime.mounts[1..], essential_mounts().as_slice());
    assert!(runtime.root.readonly);
    assert_eq!(runtime.process.args, vec!["ls"]);
    assert_eq!(runtime.process.cwd, "/");
}

#[test]
fn test_no_root_keeps_runtime_rootfs() {
    let runtime = assembler().assemble(&job(vec![])).unwrap();

    assert_eq!(runtime.mounts, essential_mounts());
    assert_eq!(runtime.root.path, "rootfs");
    assert!(runtime.root.readonly);
}

#[test]
fn test_writable_root_clears_readonly() {
    let spec = job(vec![MountIntent::new("/host/root", "/", MountMode::Writable)]);
    let runtime = assembler().assemble(&spec).unwrap();

    assert!(!runtime.root.readonly);
    assert_eq!(runtime.mounts[0].options, vec!["rbind"]);
}

#[test]
fn test_tmp_root_clears_readonly() {
    let spec = job(vec![MountIntent::new("", "/", MountMode::Tmp)]);
    let runtime = assembler().assemble(&spec).unwrap();

    assert!(!runtime.root.readonly);
    assert_eq!(runtime.mounts[0].mount_type, "tmpfs");
}

// =============================================================================
// Mount List
// =============================================================================

#[test]
fn test_essentials_present_in_every_spec() {
    let cases = vec![
        vec![],
        vec![MountIntent::new("/h", "/", MountMode::ReadOnly)],
        vec![
            MountIntent::new("/h", "/", MountMode::Writable),
            MountIntent::new("/s", "/src", MountMode::Overlay),
        ],
    ];
    for mounts in cases {
        let runtime = assembler().assemble(&job(mounts)).unwrap();
        for essential in essential_mounts() {
            assert_eq!(
                runtime.mounts.iter().filter(|m| **m == essential).count(),
                1,
                "{} should appear exactly once",
                essential.destination
            );
        }
    }
}

#[test]
fn test_user_mounts_follow_essentials_sorted() {
    let spec = job(vec![
        MountIntent::new("/h/z", "/z", MountMode::Writable),
        MountIntent::new("/h/ab", "/a/b", MountMode::ReadOnly),
        MountIntent::new("/h", "/", MountMode::Overlay),
        MountIntent::new("/h/a", "/a", MountMode::ReadOnly),
    ]);
    let runtime = assembler().assemble(&spec).unwrap();

    assert_eq!(
        destinations(&runtime),
        vec![
            "/",
            "/proc",
            "/dev",
            "/dev/pts",
            "/dev/shm",
            "/dev/mqueue",
            "/sys",
            "/a",
            "/a/b",
            "/z",
        ]
    );
}

#[test]
fn test_user_mount_destinations_are_cleaned() {
    let spec = job(vec![MountIntent::new("/h", "//data/./", MountMode::Writable)]);
    let runtime = assembler().assemble(&spec).unwrap();

    assert!(runtime.mount("/data").is_some());
}

#[test]
fn test_mode_mapping() {
    let spec = job(vec![
        MountIntent::new("/h/ro", "/ro", MountMode::ReadOnly),
        MountIntent::new("/h/rw", "/rw", MountMode::Writable),
        MountIntent::new("/h/ov", "/ov", MountMode::Overlay),
        MountIntent::new("", "/scratch", MountMode::Tmp),
    ]);
    let runtime = assembler().assemble(&spec).unwrap();

    let ro = runtime.mount("/ro").unwrap();
    assert_eq!((ro.mount_type.as_str(), ro.source.as_str()), ("none", "/h/ro"));
    assert_eq!(ro.options, vec!["rbind", "ro"]);

    let rw = runtime.mount("/rw").unwrap();
    assert_eq!(rw.options, vec!["rbind"]);

    let ov = runtime.mount("/ov").unwrap();
    assert_eq!(ov.mount_type, "overlay");
    assert_eq!(
        ov.options,
        vec![
            "lowerdir=/h/ov",
            "upperdir=/var/wf/overlay/job1/%2Fov/layer",
            "workdir=/var/wf/overlay/job1/%2Fov/work",
        ]
    );

    let scratch = runtime.mount("/scratch").unwrap();
    assert_eq!(scratch.mount_type, "tmpfs");
    assert_eq!(scratch.options, vec!["nosuid", "nodev", "mode=1777"]);
}

// =============================================================================
// Patching
// =============================================================================

#[test]
fn test_template_fields_untouched() {
    let runtime = assembler().assemble(&job(vec![])).unwrap();
    let base = RuntimeSpec::base();

    assert_eq!(runtime.linux, base.linux);
    assert_eq!(runtime.process.capabilities, base.process.capabilities);
    assert_eq!(runtime.hostname, base.hostname);
    assert_eq!(runtime.oci_version, base.oci_version);
}

#[test]
fn test_working_dir_and_command_applied() {
    let spec = ExecutionSpec::new(
        "job1",
        vec!["make".to_string(), "all".to_string()],
        vec![],
        "/src",
    )
    .unwrap();
    let runtime = assembler().assemble(&spec).unwrap();

    assert_eq!(runtime.process.args, vec!["make", "all"]);
    assert_eq!(runtime.process.cwd, "/src");
}

#[test]
fn test_env_and_hostname_overrides() {
    let spec = job(vec![])
        .with_env(vec!["PATH=/opt/bin".to_string(), "FOO=bar".to_string()])
        .with_hostname("builder");
    let runtime = assembler().assemble(&spec).unwrap();

    assert_eq!(runtime.process.env, vec!["PATH=/opt/bin", "FOO=bar"]);
    assert_eq!(runtime.hostname, "builder");
}

#[test]
fn test_custom_template() {
    let mut template = RuntimeSpec::base();
    template.process.terminal = false;
    let assembler =
        SpecAssembler::with_template(template, OverlayLayout::new("/var/wf/overlay"));

    let runtime = assembler.assemble(&job(vec![])).unwrap();
    assert!(!runtime.process.terminal);
    assert!(assembler.template().mounts.is_empty(), "template is not mutated");
}

#[test]
fn test_assembly_is_deterministic() {
    let spec = job(vec![
        MountIntent::new("/h", "/", MountMode::Overlay),
        MountIntent::new("/s", "/src", MountMode::ReadOnly),
    ]);
    assert_eq!(
        assembler().assemble(&spec).unwrap(),
        assembler().assemble(&spec).unwrap()
    );
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn test_invalid_spec_rejected() {
    let mut spec = job(vec![]);
    spec.working_dir = "relative".to_string();
    assert!(matches!(
        assembler().assemble(&spec),
        Err(Error::SpecBuildFailed(_))
    ));

    let mut spec = job(vec![]);
    spec.command.clear();
    assert!(matches!(
        assembler().assemble(&spec),
        Err(Error::SpecBuildFailed(_))
    ));
}

#[test]
fn test_reserved_mount_rejected_in_json_input() {
    // `ExecutionSpec::new` would reject it too; JSON is the other way in.
    let json = r#"{"name":"job1","command":["ls"],"mounts":[
        {"source":"/h","destination":"/dev/shm","mode":"tmp"}]}"#;
    assert!(matches!(
        ExecutionSpec::from_json(json),
        Err(Error::ReservedDestination(_))
    ));
}
