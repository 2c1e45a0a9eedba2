//! Tests for engine configuration resolution.

use mountforge::{EngineConfig, OVERLAY_DIR_ENV, SYSTEM_OVERLAY_DIR};
use std::path::{Path, PathBuf};

fn lookup(value: Option<&'static str>) -> impl Fn(&str) -> Option<String> {
    move |key| {
        assert_eq!(key, OVERLAY_DIR_ENV);
        value.map(str::to_string)
    }
}

#[test]
fn test_explicit_dir() {
    let config = EngineConfig::new("/srv/overlay");
    assert_eq!(config.overlay_dir, PathBuf::from("/srv/overlay"));
    assert_eq!(config.overlay_layout().base_dir(), Path::new("/srv/overlay"));
}

#[test]
fn test_env_var_wins_over_home() {
    let config = EngineConfig::from_lookup(lookup(Some("/env/overlay")), Some(Path::new("/home/u")));
    assert_eq!(config.overlay_dir, PathBuf::from("/env/overlay"));
}

#[test]
fn test_home_used_when_env_unset() {
    let config = EngineConfig::from_lookup(lookup(None), Some(Path::new("/home/u")));
    assert_eq!(config.overlay_dir, PathBuf::from("/home/u/.mountforge/overlay"));
}

#[test]
fn test_empty_env_is_unset() {
    let config = EngineConfig::from_lookup(lookup(Some("  ")), Some(Path::new("/home/u")));
    assert_eq!(config.overlay_dir, PathBuf::from("/home/u/.mountforge/overlay"));
}

#[test]
fn test_system_dir_without_home() {
    let config = EngineConfig::from_lookup(lookup(None), None);
    assert_eq!(config.overlay_dir, PathBuf::from(SYSTEM_OVERLAY_DIR));
}
