use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;
use predicates::str::contains;

use baseplate_core::FileId;
use baseplate_sync::payload::{save_at, PayloadRecord};

fn baseplate_cmd(project: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("baseplate"));
    cmd.current_dir(project).env("NO_COLOR", "1").env("RUST_LOG", "warn");
    cmd
}

/// Project with app `web` at `apps/web`, generated once with two files.
fn generated_project() -> TempDir {
    let project = TempDir::new().expect("project");
    project
        .child("baseplate.yaml")
        .write_str("apps:\n  - name: web\n    directory: apps/web\n")
        .expect("config");
    let files = [("README.md", "# web\n"), ("src/index.ts", "export const port = 3000;\n")];
    let app = project.child("apps/web");
    for (path, contents) in files {
        app.child(path).write_str(contents).expect("write");
    }
    let records: Vec<_> = files
        .iter()
        .map(|(path, contents)| PayloadRecord::new(FileId::from(*path), *path, contents.as_bytes().to_vec()))
        .collect();
    save_at(&app.path().join(".baseplate"), &records).expect("baseline");
    project
}

#[test]
fn status_reports_clean_then_drifted() {
    let project = generated_project();
    baseplate_cmd(project.path())
        .args(["status", "web"])
        .assert()
        .success()
        .stdout(contains("CURRENT"));

    project
        .child("apps/web/src/index.ts")
        .write_str("export const port = 8080;\n")
        .expect("edit");
    fs::remove_file(project.child("apps/web/README.md").path()).expect("rm");

    baseplate_cmd(project.path())
        .args(["status", "web"])
        .assert()
        .success()
        .stdout(contains("DRIFTED").and(contains("MODIFIED")).and(contains("MISSING")));
}

#[test]
fn status_json_and_never_generated() {
    let project = TempDir::new().expect("project");
    project
        .child("baseplate.yaml")
        .write_str("apps:\n  - name: api\n    directory: api\n")
        .expect("config");
    project.child("api").create_dir_all().expect("app dir");

    baseplate_cmd(project.path())
        .args(["status", "api", "--json"])
        .assert()
        .success()
        .stdout(contains("\"state\": \"neverGenerated\""));
}

#[test]
fn diff_shows_local_edits_as_additions() {
    let project = generated_project();
    baseplate_cmd(project.path())
        .args(["diff", "web"])
        .assert()
        .success()
        .stdout(contains("No differences for 'web'."));

    project
        .child("apps/web/README.md")
        .write_str("# web\nlocal notes\n")
        .expect("edit");
    let assert = baseplate_cmd(project.path()).args(["diff", "web"]).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.contains("--- a/README.md"));
    assert!(stdout.lines().any(|line| line == "+local notes"), "got:\n{stdout}");
}

#[test]
fn snapshot_add_show_remove() {
    let project = generated_project();
    project
        .child("apps/web/src/index.ts")
        .write_str("export const port = 8080;\n")
        .expect("edit");

    baseplate_cmd(project.path())
        .args(["snapshot", "add", "web", "src/index.ts"])
        .assert()
        .success()
        .stdout(contains("Added 1 file(s) to snapshot"));
    project
        .child("apps/web/.baseplate-snapshot/diffs/src/index.ts.diff")
        .assert(predicate::path::exists());

    baseplate_cmd(project.path())
        .args(["snapshot", "add", "web", "README.md", "--deleted"])
        .assert()
        .success();

    baseplate_cmd(project.path())
        .args(["snapshot", "show", "web"])
        .assert()
        .success()
        .stdout(contains("src/index.ts").and(contains("modified")).and(contains("deleted")));

    baseplate_cmd(project.path())
        .args(["snapshot", "show", "web", "--json"])
        .assert()
        .success()
        .stdout(contains("\"found\": true"));

    baseplate_cmd(project.path())
        .args(["snapshot", "remove", "web", "src/index.ts"])
        .assert()
        .success()
        .stdout(contains("Removed 1 file(s) from snapshot"));
    project
        .child("apps/web/.baseplate-snapshot/diffs/src/index.ts.diff")
        .assert(predicate::path::missing());
}

#[test]
fn snapshot_dir_override_and_project_flag() {
    let project = generated_project();
    project.child("apps/web/new.ts").write_str("export {};\n").expect("new file");
    let elsewhere = TempDir::new().expect("cwd");

    baseplate_cmd(elsewhere.path())
        .arg("snapshot")
        .arg("add")
        .arg("web")
        .arg("new.ts")
        .arg("--snapshot-dir")
        .arg("custom-snap")
        .arg("--project")
        .arg(project.path())
        .assert()
        .success();
    project
        .child("apps/web/custom-snap/added/new.ts")
        .assert(predicate::path::exists());
}

#[test]
fn unknown_app_and_missing_file_fail() {
    let project = generated_project();
    baseplate_cmd(project.path())
        .args(["status", "mobile"])
        .assert()
        .failure()
        .stderr(contains("unknown app 'mobile'"));

    baseplate_cmd(project.path())
        .args(["snapshot", "add", "web", "src/nope.ts"])
        .assert()
        .failure()
        .stderr(contains("snapshot-add failed"));
}
