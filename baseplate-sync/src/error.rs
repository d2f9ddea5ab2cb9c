//! Error types for baseplate-sync.

use std::path::PathBuf;

use baseplate_core::ConfigError;
use baseplate_generators::{AggregateError, GeneratorError};
use thiserror::Error;

use crate::pipeline::SyncResult;
use crate::writer::FileWriteOutcome;

/// Errors from a sync pass and the stores it reads and writes.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Generation failed; nothing was written.
    #[error("generation failed: {0}")]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A state file could not be parsed.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// Some files could not be written. Deletions and the baseline save still
    /// ran for the files that were.
    #[error("sync finished with {} failed file(s): {source}", .source.failures.len())]
    PartialWrite {
        result: Box<SyncResult>,
        #[source]
        source: BatchWriteError,
    },

    #[error("sync cancelled")]
    Cancelled,
}

/// Failure to apply one planned file operation.
#[derive(Debug, Error)]
pub enum FileWriteError {
    /// The rename destination already exists and is not being vacated.
    #[error("cannot rename '{from}' to '{to}': destination already exists")]
    RenameTargetExists { from: String, to: String },

    #[error("failed to write '{relative_path}' ({path}): {source}")]
    Io {
        relative_path: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A staged rename failed and its file could not be moved back. The
    /// original contents are left at `staged`.
    #[error("{cause}; restoring '{relative_path}' from {staged} failed: {source}")]
    RestoreFailed {
        relative_path: String,
        staged: PathBuf,
        cause: String,
        #[source]
        source: std::io::Error,
    },

    /// Cancellation arrived before this file was started.
    #[error("write of '{relative_path}' cancelled before it started")]
    Cancelled { relative_path: String },

    #[error("write task for '{relative_path}' failed: {message}")]
    Join {
        relative_path: String,
        message: String,
    },
}

impl FileWriteError {
    pub fn relative_path(&self) -> &str {
        match self {
            FileWriteError::RenameTargetExists { to, .. } => to,
            FileWriteError::Io { relative_path, .. }
            | FileWriteError::RestoreFailed { relative_path, .. }
            | FileWriteError::Cancelled { relative_path }
            | FileWriteError::Join { relative_path, .. } => relative_path,
        }
    }
}

/// Every per-file failure of one write batch, plus what did succeed.
#[derive(Debug, Error)]
#[error("{} file write(s) failed: {}", .failures.len(), summarize(.failures))]
pub struct BatchWriteError {
    pub failures: Vec<FileWriteError>,
    pub outcomes: Vec<FileWriteOutcome>,
}

fn summarize(failures: &[FileWriteError]) -> String {
    failures
        .iter()
        .map(|f| f.relative_path().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors from snapshot bookkeeping and patch application.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse snapshot manifest at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    InvalidPath(#[from] AggregateError),

    /// A file passed to `snapshot add` does not exist in the app.
    #[error("file '{path}' does not exist; pass --deleted to record a deletion")]
    FileNotFound { path: String },

    /// A stored diff targets a file the generator no longer emits.
    #[error("snapshot diff for '{path}' has no generated file to apply to")]
    MissingTarget { path: String },

    #[error("patch for '{path}' does not apply: {source}")]
    Patch {
        path: String,
        #[source]
        source: PatchError,
    },

    #[error("file '{path}' is not valid UTF-8 and cannot be diffed")]
    NotText { path: String },
}

/// Errors from parsing or applying a unified diff.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("malformed hunk header '{line}'")]
    BadHeader { line: String },

    #[error("unexpected line {line_number} in diff: '{line}'")]
    UnexpectedLine { line_number: usize, line: String },

    /// Context or removed lines of a hunk are not found in the target.
    #[error("hunk {hunk} (starting at original line {old_start}) does not match")]
    HunkMismatch { hunk: usize, old_start: usize },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn snapshot_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SnapshotError {
    SnapshotError::Io {
        path: path.into(),
        source,
    }
}
