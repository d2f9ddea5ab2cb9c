use std::path::PathBuf;

use thiserror::Error;

/// Error surface for isolated action runs and the service actions.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The action did not finish within its budget and was aborted.
    #[error("action '{action}' timed out after {secs}s")]
    Timeout { action: String, secs: u64 },

    #[error("action '{action}' was cancelled")]
    Cancelled { action: String },

    #[error("unknown action '{name}' (known actions: {known})")]
    UnknownAction { name: String, known: String },

    #[error("invalid input for action '{action}': {source}")]
    Input {
        action: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] baseplate_core::ConfigError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] baseplate_sync::SnapshotError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The action task ended without reporting a result (panicked).
    #[error("action '{action}' failed: {message}")]
    Join { action: String, message: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> WorkerError {
    WorkerError::Io {
        path: path.into(),
        source,
    }
}
