//! `baseplate snapshot add|remove|show`, run through the action worker.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use baseplate_sync::SnapshotManifest;
use baseplate_worker::{dispatch_blocking, ActionRequest, RunOptions};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::Deserialize;
use serde_json::{json, Value};
use tabled::{settings::Style, Table, Tabled};

use super::AppSelector;

#[derive(Subcommand, Debug)]
pub enum SnapshotCommand {
    /// Record files (relative to the app) as modified, added or deleted.
    Add(AddArgs),

    /// Forget files previously recorded in the snapshot.
    Remove(RemoveArgs),

    /// Print the snapshot manifest.
    Show(ShowArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    #[command(flatten)]
    pub target: AppSelector,

    #[arg(required = true)]
    pub files: Vec<String>,

    /// Record the files as intentionally deleted.
    #[arg(long)]
    pub deleted: bool,

    /// Snapshot directory relative to the app.
    #[arg(long)]
    pub snapshot_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    #[command(flatten)]
    pub target: AppSelector,

    #[arg(required = true)]
    pub files: Vec<String>,

    #[arg(long)]
    pub snapshot_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    #[command(flatten)]
    pub target: AppSelector,

    #[arg(long)]
    pub snapshot_dir: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run(command: SnapshotCommand) -> Result<()> {
    match command {
        SnapshotCommand::Add(args) => {
            let data = call(
                "snapshot-add",
                &args.target,
                json!({
                    "files": args.files,
                    "deleted": args.deleted,
                    "snapshotDirectory": args.snapshot_dir,
                }),
            )?;
            let summary: Summary = serde_json::from_value(data).context("unexpected snapshot-add response")?;
            println!("{} {}", "✓".green().bold(), summary.message);
            for path in summary.paths {
                println!("  {path}");
            }
            Ok(())
        }
        SnapshotCommand::Remove(args) => {
            let data = call(
                "snapshot-remove",
                &args.target,
                json!({ "files": args.files, "snapshotDirectory": args.snapshot_dir }),
            )?;
            let summary: Summary = serde_json::from_value(data).context("unexpected snapshot-remove response")?;
            println!("{} {}", "✓".green().bold(), summary.message);
            for path in summary.paths {
                println!("  {path}");
            }
            Ok(())
        }
        SnapshotCommand::Show(args) => {
            let data = call(
                "snapshot-show",
                &args.target,
                json!({ "snapshotDirectory": args.snapshot_dir }),
            )?;
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&data).context("failed to serialize snapshot JSON")?
                );
                return Ok(());
            }
            let shown: Shown = serde_json::from_value(data).context("unexpected snapshot-show response")?;
            match shown.manifest {
                Some(manifest) if shown.found => print_manifest(&args.target.app, &manifest),
                _ => println!("No snapshot for '{}'.", args.target.app),
            }
            Ok(())
        }
    }
}

/// Send one snapshot action to the worker and unwrap its envelope.
fn call(action: &str, target: &AppSelector, mut input: Value) -> Result<Value> {
    let config = target.load_config()?;
    if let Some(fields) = input.as_object_mut() {
        fields.insert("project".into(), json!(target.project));
        fields.insert("app".into(), json!(target.app));
    }
    let response = dispatch_blocking(
        ActionRequest::new(action, input),
        RunOptions::from_settings(&config.worker),
    )
    .with_context(|| format!("failed to start worker for '{action}'"))?;
    response
        .into_data()
        .map_err(|message| anyhow!("{action} failed: {message}"))
}

#[derive(Deserialize)]
struct Summary {
    message: String,
    #[serde(default)]
    paths: Vec<String>,
}

#[derive(Deserialize)]
struct Shown {
    found: bool,
    manifest: Option<SnapshotManifest>,
}

#[derive(Tabled)]
struct ManifestRow {
    #[tabled(rename = "file")]
    path: String,
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "stored as")]
    artifact: String,
}

fn print_manifest(app: &str, manifest: &SnapshotManifest) {
    println!("Snapshot for '{}' | {} file(s)", app.bold(), manifest.len());
    if manifest.is_empty() {
        return;
    }

    let files = &manifest.files;
    let mut rows: Vec<ManifestRow> = files
        .modified
        .iter()
        .map(|entry| ManifestRow {
            path: entry.path.clone(),
            kind: "modified".yellow().to_string(),
            artifact: entry.diff_file.clone(),
        })
        .chain(files.added.iter().map(|path| ManifestRow {
            path: path.clone(),
            kind: "added".green().to_string(),
            artifact: format!("added/{path}"),
        }))
        .chain(files.deleted.iter().map(|path| ManifestRow {
            path: path.clone(),
            kind: "deleted".red().to_string(),
            artifact: "-".to_string(),
        }))
        .collect();
    rows.sort_by(|a, b| a.path.cmp(&b.path));

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
