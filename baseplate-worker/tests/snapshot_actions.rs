use std::fs;
use std::path::Path;

use baseplate_core::FileId;
use baseplate_sync::payload::{save_at, PayloadRecord};
use baseplate_worker::{dispatch, ActionRegistry, ActionRequest, RunOptions};
use serde_json::{json, Value};
use tempfile::TempDir;

/// A project with one app `web` whose `src/app.ts` was generated as `v1`.
fn project() -> TempDir {
    let root = TempDir::new().unwrap();
    fs::write(
        root.path().join("baseplate.yaml"),
        "apps:\n  - name: web\n    directory: apps/web\n",
    )
    .unwrap();
    let app = root.path().join("apps/web");
    fs::create_dir_all(app.join("src")).unwrap();
    fs::write(app.join("src/app.ts"), "export const v = 1;\n").unwrap();
    save_at(
        &app.join(".baseplate"),
        &[PayloadRecord::new(
            FileId::from("app"),
            "src/app.ts",
            b"export const v = 1;\n".to_vec(),
        )],
    )
    .unwrap();
    root
}

async fn call(action: &str, input: Value) -> Value {
    let registry = ActionRegistry::with_defaults();
    let response = dispatch(&registry, ActionRequest::new(action, input), &RunOptions::default()).await;
    response.into_data().unwrap()
}

fn input(root: &Path, files: &[&str]) -> Value {
    json!({ "project": root, "app": "web", "files": files })
}

#[tokio::test]
async fn add_show_remove_round_trip() {
    let root = project();
    let app = root.path().join("apps/web");
    fs::write(app.join("src/app.ts"), "export const v = 2;\n").unwrap();
    fs::write(app.join("src/extra.ts"), "export {};\n").unwrap();

    let added = call("snapshot-add", input(root.path(), &["src/app.ts", "src/extra.ts"])).await;
    assert_eq!(added["success"], true);
    assert_eq!(added["filesAdded"], 2);
    assert_eq!(added["paths"], json!(["src/app.ts", "src/extra.ts"]));
    assert!(app.join(".baseplate-snapshot/diffs/src/app.ts.diff").exists());

    let shown = call("snapshot-show", input(root.path(), &[])).await;
    assert_eq!(shown["found"], true);
    let manifest = &shown["manifest"];
    assert_eq!(manifest["files"]["modified"][0]["path"], "src/app.ts");
    assert_eq!(manifest["files"]["added"][0], "src/extra.ts");

    let removed = call("snapshot-remove", input(root.path(), &["src/app.ts", "never-added.ts"])).await;
    assert_eq!(removed["filesRemoved"], 1);
    assert_eq!(removed["paths"], json!(["src/app.ts"]));
    assert!(!app.join(".baseplate-snapshot/diffs/src/app.ts.diff").exists());
}

#[tokio::test]
async fn show_without_snapshot_reports_not_found() {
    let root = project();
    let shown = call("snapshot-show", input(root.path(), &[])).await;
    assert_eq!(shown, json!({ "found": false, "manifest": null }));
}

#[tokio::test]
async fn errors_come_back_in_the_envelope() {
    let root = project();
    let registry = ActionRegistry::with_defaults();

    let unknown_app = dispatch(
        &registry,
        ActionRequest::new("snapshot-show", json!({ "project": root.path(), "app": "api" })),
        &RunOptions::default(),
    )
    .await;
    assert!(!unknown_app.ok);
    assert!(unknown_app.error.unwrap().contains("api"));

    let missing_file = dispatch(
        &registry,
        ActionRequest::new("snapshot-add", input(root.path(), &["src/missing.ts"])),
        &RunOptions::default(),
    )
    .await;
    assert!(!missing_file.ok);

    let bad_input = dispatch(&registry, ActionRequest::new("snapshot-add", json!({ "app": 3 })), &RunOptions::default()).await;
    assert!(bad_input.error.unwrap().contains("invalid input"));
}
