//! Config error-message and atomic-save integration tests.

use assert_fs::prelude::*;
use baseplate_core::{config, AppConfig, BaseplateConfig, ConfigError};
use predicates::prelude::predicate;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("baseplate.yaml")
        .write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = config::load_at(root.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    let msg = err.to_string();
    assert!(msg.contains("baseplate.yaml"), "must contain file path, got: {msg}");
}

#[test]
fn load_wrong_type_yaml_returns_parse_error() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("baseplate.yaml")
        .write_str("- this is a list, not a mapping\n")
        .expect("write");

    let err = config::load_at(root.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

#[test]
fn empty_file_is_treated_as_defaults() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("baseplate.yaml").write_str("\n").expect("write");
    assert_eq!(config::load_at(root.path()).unwrap(), BaseplateConfig::default());
}

// ---------------------------------------------------------------------------
// 2. Atomic save
// ---------------------------------------------------------------------------

#[test]
fn save_creates_file_and_removes_tmp() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let project = root.child("nested/project");

    let mut cfg = BaseplateConfig::default();
    cfg.apps.push(AppConfig {
        name: "web".to_string(),
        directory: PathBuf::from("apps/web"),
    });
    config::save_at(project.path(), &cfg).expect("save");

    project.child("baseplate.yaml").assert(predicate::path::exists());
    project
        .child("baseplate.yaml")
        .assert(predicate::str::contains("apps/web"));
    project
        .child("baseplate.yaml.tmp")
        .assert(predicate::path::missing());
}
