//! Applies a prepared plan to the app directory.
//!
//! ## Protocol
//!
//! 1. Renames, staged through temporary names so chains and swaps work.
//! 2. Content writes, concurrently, each through `<path>.baseplate.tmp` and
//!    a rename (atomic on POSIX). Identical contents are left untouched.
//! 3. The generated mirror and `.conflict` side files, written the same way.
//!
//! A failure is recorded against its file and the batch carries on; the
//! caller gets every failure together with every outcome that succeeded.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use baseplate_core::FileId;
use baseplate_generators::CancelSignal;
use serde::Serialize;
use tokio::task::JoinSet;

use crate::error::{BatchWriteError, FileWriteError};
use crate::prepare::FileOperationResult;

const MAX_CONCURRENT_WRITES: usize = 16;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteStatus {
    /// Contents were written (changed or did not previously exist).
    Written,
    /// Disk already held the planned contents, or nothing was planned.
    Unchanged,
}

/// What happened to one planned file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWriteOutcome {
    pub id: FileId,
    pub relative_path: String,
    pub renamed_from: Option<String>,
    pub status: WriteStatus,
    pub conflict_relative_path: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct WriterOptions {
    /// Receives the generated (pre-merge) bytes of every file.
    pub mirror_dir: Option<PathBuf>,
    pub cancel: CancelSignal,
}

// ---------------------------------------------------------------------------
// atomic_write
// ---------------------------------------------------------------------------

/// Write `contents` to `path` via a `.baseplate.tmp` sibling and a rename.
///
/// Returns `false` without touching the file when it already holds
/// `contents`.
pub fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<bool> {
    let tmp = PathBuf::from(format!("{}.baseplate.tmp", path.display()));
    atomic_write_with_tmp(path, contents, &tmp)
}

fn atomic_write_with_tmp(path: &Path, contents: &[u8], tmp: &Path) -> std::io::Result<bool> {
    match std::fs::read(path) {
        Ok(existing) if existing == contents => return Ok(false),
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if let Some(parent) = tmp.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(tmp, contents)?;
    if let Err(err) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(err);
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// write_operations
// ---------------------------------------------------------------------------

/// Apply `operations` under `app_dir`.
pub async fn write_operations(
    app_dir: &Path,
    operations: &[FileOperationResult],
    options: &WriterOptions,
) -> Result<Vec<FileWriteOutcome>, BatchWriteError> {
    let mut failures: HashMap<usize, FileWriteError> = HashMap::new();
    apply_renames(app_dir, operations, &options.cancel, &mut failures).await;

    let app_dir: Arc<Path> = Arc::from(app_dir);
    let mirror_dir: Option<Arc<Path>> = options.mirror_dir.as_deref().map(Arc::from);
    let mut outcomes = Vec::with_capacity(operations.len());
    let mut running: JoinSet<(usize, Result<FileWriteOutcome, FileWriteError>)> = JoinSet::new();

    for (index, operation) in operations.iter().enumerate() {
        if failures.contains_key(&index) {
            continue;
        }
        if options.cancel.is_cancelled() {
            failures.insert(
                index,
                FileWriteError::Cancelled {
                    relative_path: operation.relative_path.clone(),
                },
            );
            continue;
        }
        while running.len() >= MAX_CONCURRENT_WRITES {
            if let Some(joined) = running.join_next().await {
                collect(joined, &mut outcomes, &mut failures);
            }
        }
        let app_dir = Arc::clone(&app_dir);
        let mirror_dir = mirror_dir.clone();
        let operation = operation.clone();
        running.spawn_blocking(move || (index, write_guarded(&app_dir, mirror_dir.as_deref(), &operation)));
    }
    while let Some(joined) = running.join_next().await {
        collect(joined, &mut outcomes, &mut failures);
    }

    outcomes.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    if failures.is_empty() {
        return Ok(outcomes);
    }
    let mut failures: Vec<(usize, FileWriteError)> = failures.into_iter().collect();
    failures.sort_by_key(|(index, _)| *index);
    Err(BatchWriteError {
        failures: failures.into_iter().map(|(_, failure)| failure).collect(),
        outcomes,
    })
}

fn collect(
    joined: Result<(usize, Result<FileWriteOutcome, FileWriteError>), tokio::task::JoinError>,
    outcomes: &mut Vec<FileWriteOutcome>,
    failures: &mut HashMap<usize, FileWriteError>,
) {
    match joined {
        Ok((_, Ok(outcome))) => outcomes.push(outcome),
        Ok((index, Err(failure))) => {
            tracing::warn!(path = %failure.relative_path(), error = %failure, "write failed");
            failures.insert(index, failure);
        }
        // Tasks are never aborted and panics are caught inside them.
        Err(join_error) => tracing::error!(error = %join_error, "write task vanished"),
    }
}

fn write_guarded(
    app_dir: &Path,
    mirror_dir: Option<&Path>,
    operation: &FileOperationResult,
) -> Result<FileWriteOutcome, FileWriteError> {
    std::panic::catch_unwind(AssertUnwindSafe(|| write_one(app_dir, mirror_dir, operation))).unwrap_or_else(
        |panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic".to_string());
            Err(FileWriteError::Join {
                relative_path: operation.relative_path.clone(),
                message,
            })
        },
    )
}

fn write_one(
    app_dir: &Path,
    mirror_dir: Option<&Path>,
    operation: &FileOperationResult,
) -> Result<FileWriteOutcome, FileWriteError> {
    let io = |path: &Path, source: std::io::Error| FileWriteError::Io {
        relative_path: operation.relative_path.clone(),
        path: path.to_path_buf(),
        source,
    };

    let mut status = WriteStatus::Unchanged;
    if let Some(contents) = &operation.merged_contents {
        let path = app_dir.join(&operation.relative_path);
        if atomic_write(&path, contents).map_err(|e| io(&path, e))? {
            tracing::info!(path = %operation.relative_path, "wrote");
            status = WriteStatus::Written;
        } else {
            tracing::debug!(path = %operation.relative_path, "unchanged");
        }
    }
    if let Some(mirror_dir) = mirror_dir {
        let path = mirror_dir.join(&operation.relative_path);
        atomic_write(&path, &operation.generated_contents).map_err(|e| io(&path, e))?;
    }
    if let Some(conflict) = &operation.conflict_relative_path {
        let path = app_dir.join(conflict);
        atomic_write(&path, &operation.generated_contents).map_err(|e| io(&path, e))?;
        tracing::warn!(path = %conflict, "generated contents written to side file");
    }

    Ok(FileWriteOutcome {
        id: operation.id.clone(),
        relative_path: operation.relative_path.clone(),
        renamed_from: operation.previous_relative_path.clone(),
        status,
        conflict_relative_path: operation.conflict_relative_path.clone(),
    })
}

// ---------------------------------------------------------------------------
// Renames
// ---------------------------------------------------------------------------

async fn apply_renames(
    app_dir: &Path,
    operations: &[FileOperationResult],
    cancel: &CancelSignal,
    failures: &mut HashMap<usize, FileWriteError>,
) {
    let vacated: HashSet<&str> = operations
        .iter()
        .filter_map(|op| op.previous_relative_path.as_deref())
        .collect();

    let mut staged: Vec<(usize, PathBuf, PathBuf)> = Vec::new();
    for (index, operation) in operations.iter().enumerate() {
        let Some(from) = operation.previous_relative_path.as_deref() else {
            continue;
        };
        let to = operation.relative_path.as_str();
        if cancel.is_cancelled() {
            failures.insert(index, FileWriteError::Cancelled { relative_path: to.to_string() });
            continue;
        }
        let source = app_dir.join(from);
        if !vacated.contains(to) && exists(&app_dir.join(to)).await {
            failures.insert(index, rename_conflict(from, to));
            continue;
        }
        let temp = PathBuf::from(format!("{}.baseplate-rename-{index}", source.display()));
        if let Err(source_err) = tokio::fs::rename(&source, &temp).await {
            failures.insert(index, rename_io(to, &source, source_err));
            continue;
        }
        staged.push((index, source, temp));
    }

    for (index, source, temp) in staged {
        let operation = &operations[index];
        let to = operation.relative_path.as_str();
        let destination = app_dir.join(to);
        // A vacating rename that failed leaves its file in place.
        if exists(&destination).await {
            let from = operation.previous_relative_path.as_deref().unwrap_or_default();
            let failure = restore_staged(&temp, &source, rename_conflict(from, to)).await;
            failures.insert(index, failure);
            continue;
        }
        if let Some(parent) = destination.parent() {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                let failure = restore_staged(&temp, &source, rename_io(to, parent, err)).await;
                failures.insert(index, failure);
                continue;
            }
        }
        match tokio::fs::rename(&temp, &destination).await {
            Ok(()) => tracing::info!(
                from = operation.previous_relative_path.as_deref().unwrap_or_default(),
                to,
                "renamed"
            ),
            Err(err) => {
                let failure = restore_staged(&temp, &source, rename_io(to, &destination, err)).await;
                failures.insert(index, failure);
            }
        }
    }
}

/// Move a staged rename back to `source`. Returns `failure` unchanged when
/// that works, otherwise an error naming where the file was left.
async fn restore_staged(temp: &Path, source: &Path, failure: FileWriteError) -> FileWriteError {
    match tokio::fs::rename(temp, source).await {
        Ok(()) => failure,
        Err(err) => {
            tracing::error!(
                staged = %temp.display(),
                original = %source.display(),
                error = %err,
                "could not restore a staged rename"
            );
            FileWriteError::RestoreFailed {
                relative_path: failure.relative_path().to_string(),
                staged: temp.to_path_buf(),
                cause: failure.to_string(),
                source: err,
            }
        }
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

fn rename_conflict(from: &str, to: &str) -> FileWriteError {
    FileWriteError::RenameTargetExists {
        from: from.to_string(),
        to: to.to_string(),
    }
}

fn rename_io(to: &str, path: &Path, source: std::io::Error) -> FileWriteError {
    FileWriteError::Io {
        relative_path: to.to_string(),
        path: path.to_path_buf(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
