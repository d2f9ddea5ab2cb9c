//! The sync pass: generate, plan, write, reconcile, record, run commands.
//!
//! This is the one entrypoint shared by the CLI and the worker.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use baseplate_core::SyncSettings;
use baseplate_generators::{
    execute_generator_entry, CancelSignal, ExecuteOptions, GeneratorBundle, GeneratorError, MetadataOptions,
};
use serde::Serialize;

use crate::commands::{run_post_write_commands, CommandOutcome};
use crate::error::SyncError;
use crate::merge::MergeStrategies;
use crate::payload::{self, GeneratedPayload, PayloadRecord};
use crate::prepare::{prepare_operations, FileOperationResult};
use crate::reconcile::{reconcile_deletions, ReconcileOptions, ReconcileResult};
use crate::writer::{write_operations, FileWriteOutcome, WriteStatus, WriterOptions};

/// Everything one sync pass needs.
pub struct SyncRequest {
    pub app_dir: PathBuf,
    pub bundle: GeneratorBundle,
    pub settings: SyncSettings,
    /// Plan and report only; nothing on disk changes.
    pub dry_run: bool,
    pub cancel: CancelSignal,
    pub strategies: MergeStrategies,
    pub metadata_options: MetadataOptions,
}

impl SyncRequest {
    pub fn new(app_dir: impl Into<PathBuf>, bundle: GeneratorBundle) -> Self {
        Self {
            app_dir: app_dir.into(),
            bundle,
            settings: SyncSettings::default(),
            dry_run: false,
            cancel: CancelSignal::never(),
            strategies: MergeStrategies::default(),
            metadata_options: MetadataOptions::default(),
        }
    }

    pub fn settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn strategies(mut self, strategies: MergeStrategies) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn metadata_options(mut self, options: MetadataOptions) -> Self {
        self.metadata_options = options;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenamedFile {
    pub from: String,
    pub to: String,
}

/// Report of one sync pass. In a dry run the lists describe what would
/// happen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub written: Vec<String>,
    pub unchanged: Vec<String>,
    pub renamed: Vec<RenamedFile>,
    pub conflicts: Vec<String>,
    pub deleted: Vec<String>,
    pub pending_delete: Vec<String>,
    pub removed_directories: Vec<String>,
    pub commands: Vec<CommandOutcome>,
    pub dry_run: bool,
}

impl SyncResult {
    pub fn command_failures(&self) -> impl Iterator<Item = &CommandOutcome> {
        self.commands.iter().filter(|outcome| !outcome.succeeded())
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Run one sync pass for `request.app_dir`.
pub async fn sync_app(request: SyncRequest) -> Result<SyncResult, SyncError> {
    let SyncRequest {
        app_dir,
        bundle,
        settings,
        dry_run,
        cancel,
        strategies,
        metadata_options,
    } = request;
    let state_dir = state_dir_at(&app_dir, &settings);

    let previous = payload::load_at(&state_dir)?;
    let options = ExecuteOptions {
        metadata_options,
        cancel: cancel.clone(),
    };
    let output = match execute_generator_entry(bundle, &options).await {
        Ok(output) => output,
        Err(GeneratorError::Cancelled) => return Err(SyncError::Cancelled),
        Err(err) => return Err(err.into()),
    };
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    tracing::debug!(files = output.files.len(), commands = output.post_write_commands.len(), "generated");

    let operations = prepare_operations(&app_dir, &output, previous.as_ref(), &strategies)?;
    let current = output.file_id_map();
    let reconcile_options = ReconcileOptions {
        metadata_files: &settings.metadata_files,
        disposable_files: &settings.disposable_files,
        dry_run,
    };

    if dry_run {
        let reconciled = match &previous {
            Some(previous) => reconcile_deletions(&app_dir, previous, &current, &[], reconcile_options)?,
            None => ReconcileResult::default(),
        };
        let result = planned_result(&operations, reconciled);
        tracing::info!(app = %app_dir.display(), would_write = result.written.len(), "[dry-run] sync planned");
        return Ok(result);
    }

    let writer_options = WriterOptions {
        mirror_dir: settings
            .generated_mirror_directory
            .as_ref()
            .map(|dir| app_dir.join(dir)),
        cancel: cancel.clone(),
    };
    let (outcomes, write_error) = match write_operations(&app_dir, &operations, &writer_options).await {
        Ok(outcomes) => (outcomes, None),
        Err(mut err) => (std::mem::take(&mut err.outcomes), Some(err)),
    };
    if cancel.is_cancelled() {
        tracing::warn!(
            app = %app_dir.display(),
            applied = outcomes.len(),
            "sync cancelled during writes, skipping deletions and the baseline save"
        );
        return Err(SyncError::Cancelled);
    }

    let vacated: Vec<String> = outcomes.iter().filter_map(|o| o.renamed_from.clone()).collect();
    let reconciled = match &previous {
        Some(previous) => reconcile_deletions(&app_dir, previous, &current, &vacated, reconcile_options)?,
        None => ReconcileResult::default(),
    };

    let records = next_baseline(&operations, &outcomes, previous.as_ref(), &reconciled)?;
    payload::save_at(&state_dir, &records)?;

    let written: HashSet<String> = outcomes
        .iter()
        .filter(|o| o.status == WriteStatus::Written || o.renamed_from.is_some())
        .map(|o| o.relative_path.clone())
        .collect();
    let commands = run_post_write_commands(
        &app_dir,
        &output.post_write_commands,
        &written,
        Duration::from_secs(settings.command_timeout_secs),
        &cancel,
    )
    .await;

    let result = written_result(&operations, &outcomes, reconciled, commands);
    tracing::info!(
        app = %app_dir.display(),
        written = result.written.len(),
        renamed = result.renamed.len(),
        conflicts = result.conflicts.len(),
        deleted = result.deleted.len(),
        pending_delete = result.pending_delete.len(),
        "sync finished"
    );

    match write_error {
        None => Ok(result),
        Some(source) => Err(SyncError::PartialWrite {
            result: Box::new(result),
            source,
        }),
    }
}

/// Records for the next payload: new generated contents for every file that
/// was applied; the previous baseline for files that failed and for pending
/// deletes.
fn next_baseline(
    operations: &[FileOperationResult],
    outcomes: &[FileWriteOutcome],
    previous: Option<&GeneratedPayload>,
    reconciled: &ReconcileResult,
) -> Result<Vec<PayloadRecord>, SyncError> {
    let applied: HashSet<&str> = outcomes.iter().map(|o| o.relative_path.as_str()).collect();
    let mut records = Vec::with_capacity(operations.len() + reconciled.relative_paths_pending_delete.len());
    let mut paths: HashSet<String> = HashSet::new();

    for operation in operations.iter().filter(|op| applied.contains(op.relative_path.as_str())) {
        paths.insert(operation.relative_path.clone());
        records.push(PayloadRecord::new(
            operation.id.clone(),
            operation.relative_path.clone(),
            operation.generated_contents.clone(),
        ));
    }

    let Some(previous) = previous else {
        return Ok(records);
    };
    let failed = operations
        .iter()
        .filter(|op| !applied.contains(op.relative_path.as_str()))
        .filter_map(|op| previous.entry(&op.id).map(|entry| (op.id.clone(), entry)));
    let pending = reconciled.relative_paths_pending_delete.iter().filter_map(|path| {
        let id = previous.owner_of(path)?;
        previous.entry(id).map(|entry| (id.clone(), entry))
    });
    for (id, entry) in failed.chain(pending) {
        if !paths.insert(entry.path.clone()) {
            continue;
        }
        records.push(PayloadRecord {
            id,
            path: entry.path.clone(),
            hash: entry.hash.clone(),
            contents: previous.read_generated(&entry.path)?,
        });
    }
    Ok(records)
}

fn written_result(
    operations: &[FileOperationResult],
    outcomes: &[FileWriteOutcome],
    reconciled: ReconcileResult,
    commands: Vec<CommandOutcome>,
) -> SyncResult {
    let mut result = SyncResult {
        conflicts: conflicts(operations),
        deleted: reconciled.deleted_relative_paths,
        pending_delete: reconciled.relative_paths_pending_delete,
        removed_directories: reconciled.removed_directories,
        commands,
        ..SyncResult::default()
    };
    for outcome in outcomes {
        if let Some(from) = &outcome.renamed_from {
            result.renamed.push(RenamedFile {
                from: from.clone(),
                to: outcome.relative_path.clone(),
            });
        }
        match outcome.status {
            WriteStatus::Written => result.written.push(outcome.relative_path.clone()),
            WriteStatus::Unchanged if outcome.renamed_from.is_none() => {
                result.unchanged.push(outcome.relative_path.clone())
            }
            WriteStatus::Unchanged => {}
        }
    }
    result
}

fn planned_result(operations: &[FileOperationResult], reconciled: ReconcileResult) -> SyncResult {
    let mut result = SyncResult {
        conflicts: conflicts(operations),
        deleted: reconciled.deleted_relative_paths,
        pending_delete: reconciled.relative_paths_pending_delete,
        dry_run: true,
        ..SyncResult::default()
    };
    for operation in operations {
        if let Some(from) = &operation.previous_relative_path {
            result.renamed.push(RenamedFile {
                from: from.clone(),
                to: operation.relative_path.clone(),
            });
        }
        if operation.writes_contents() {
            result.written.push(operation.relative_path.clone());
        } else if !operation.is_rename() {
            result.unchanged.push(operation.relative_path.clone());
        }
    }
    result
}

fn conflicts(operations: &[FileOperationResult]) -> Vec<String> {
    operations
        .iter()
        .filter(|op| op.has_conflict)
        .map(|op| op.relative_path.clone())
        .collect()
}

/// `<app_dir>/<state_directory>`.
pub fn state_dir_at(app_dir: &Path, settings: &SyncSettings) -> PathBuf {
    app_dir.join(&settings.state_directory)
}
