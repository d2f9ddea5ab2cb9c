//! Error types for baseplate-generators.

use baseplate_core::{FileId, GraphError, ProviderError, TaskId};
use thiserror::Error;

/// Error type generator closures return; anything `Error + Send + Sync`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while resolving or executing a generator bundle.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Two children of the same bundle share a name.
    #[error("bundle '{parent}' has two children named '{name}'")]
    DuplicateBundle { parent: String, name: String },

    /// Two tasks of the same bundle share a name.
    #[error("duplicate task id '{id}'")]
    DuplicateTask { id: TaskId },

    /// A task exports into a scope no ancestor declares.
    #[error("task '{task}' exports '{provider}' into scope '{scope}', which no ancestor declares")]
    ScopeNotFound {
        task: TaskId,
        provider: String,
        scope: String,
    },

    /// A required dependency has no exporter in any visible scope.
    #[error("task '{task}' depends on provider '{provider}', which is not exported in any visible scope")]
    MissingProvider { task: TaskId, provider: String },

    /// `run` returned without a provider the task declared as an export.
    #[error("task '{task}' declared export '{provider}' but did not provide it")]
    ExportNotProvided { task: TaskId, provider: String },

    /// `build` returned without a provider the task declared as an output.
    #[error("task '{task}' declared output '{provider}' but did not produce it")]
    OutputNotProvided { task: TaskId, provider: String },

    #[error("task '{task}' failed in run: {source}")]
    TaskRun {
        task: TaskId,
        #[source]
        source: BoxError,
    },

    #[error("task '{task}' failed in build: {source}")]
    TaskBuild {
        task: TaskId,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// Tera failed to parse or render a template.
    #[error("template '{name}' failed: {source}")]
    Template {
        name: String,
        #[source]
        source: tera::Error,
    },

    /// A template context could not be serialized to JSON.
    #[error("template context serialization error: {0}")]
    TemplateContext(#[from] serde_json::Error),

    #[error("generation cancelled")]
    Cancelled,

    /// A worker thread panicked or was torn down.
    #[error("task worker failed: {0}")]
    Join(String),
}

/// Errors from combining per-task file contributions into one output set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    /// Two different file ids claim the same path.
    #[error("path '{path}' is claimed by file ids '{first_id}' ({first_task}) and '{second_id}' ({second_task})")]
    AmbiguousPath {
        path: String,
        first_id: FileId,
        first_task: TaskId,
        second_id: FileId,
        second_task: TaskId,
    },

    /// One file id was emitted at two different paths.
    #[error("file id '{id}' is emitted at both '{first_path}' and '{second_path}'")]
    AmbiguousFileId {
        id: FileId,
        first_path: String,
        second_path: String,
    },

    /// Same id and path written twice with different contents.
    #[error("file '{path}' ({id}) is written by {first_task} and {second_task} with different contents")]
    ConflictingWrite {
        path: String,
        id: FileId,
        first_task: TaskId,
        second_task: TaskId,
    },

    #[error("invalid output path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },
}
