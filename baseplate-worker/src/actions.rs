//! Service actions the worker can run, addressed by name.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use baseplate_generators::CancelSignal;
use baseplate_sync::{snapshot_actions, SnapshotTarget};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::error::WorkerError;
use crate::protocol::{LogLevel, LogRecord};

/// Handed to a running action: its log channel and cancellation signal.
#[derive(Debug, Clone)]
pub struct ActionContext {
    logs: mpsc::UnboundedSender<LogRecord>,
    cancel: CancelSignal,
}

impl ActionContext {
    pub(crate) fn new(logs: mpsc::UnboundedSender<LogRecord>, cancel: CancelSignal) -> Self {
        Self { logs, cancel }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        // The receiver is gone once the run has finished; late lines are dropped.
        let _ = self.logs.send(LogRecord {
            level,
            message: message.into(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn cancel(&self) -> &CancelSignal {
        &self.cancel
    }
}

#[async_trait]
pub trait ServiceAction: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, input: Value, ctx: ActionContext) -> Result<Value, WorkerError>;
}

/// Name → action table.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<&'static str, Arc<dyn ServiceAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The snapshot actions.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(SnapshotAdd)
            .register(SnapshotRemove)
            .register(SnapshotShow)
    }

    pub fn register(mut self, action: impl ServiceAction + 'static) -> Self {
        self.actions.insert(action.name(), Arc::new(action));
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ServiceAction>, WorkerError> {
        self.actions
            .get(name)
            .cloned()
            .ok_or_else(|| WorkerError::UnknownAction {
                name: name.to_string(),
                known: self.names().collect::<Vec<_>>().join(", "),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.actions.keys().copied()
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Snapshot actions
// ---------------------------------------------------------------------------

/// Input shared by the snapshot actions.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInput {
    /// Project root holding `baseplate.yaml`.
    pub project: PathBuf,
    pub app: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub deleted: bool,
    /// Overrides the configured snapshot directory, relative to the app.
    #[serde(default)]
    pub snapshot_directory: Option<PathBuf>,
}

impl SnapshotInput {
    fn target(&self) -> Result<SnapshotTarget, WorkerError> {
        let config = baseplate_core::config::load_at(&self.project)?;
        let app_dir = config.app_directory(&self.project, &self.app)?;
        Ok(SnapshotTarget::new(
            app_dir,
            &config.sync,
            self.snapshot_directory.as_deref(),
        ))
    }
}

fn parse_input<T: DeserializeOwned>(action: &str, input: Value) -> Result<T, WorkerError> {
    serde_json::from_value(input).map_err(|source| WorkerError::Input {
        action: action.to_string(),
        source,
    })
}

/// Run blocking snapshot work off the async threads.
async fn blocking<T, F>(action: &'static str, work: F) -> Result<T, WorkerError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, WorkerError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| WorkerError::Join {
            action: action.to_string(),
            message: err.to_string(),
        })?
}

pub struct SnapshotAdd;

#[async_trait]
impl ServiceAction for SnapshotAdd {
    fn name(&self) -> &'static str {
        "snapshot-add"
    }

    async fn execute(&self, input: Value, ctx: ActionContext) -> Result<Value, WorkerError> {
        let input: SnapshotInput = parse_input(self.name(), input)?;
        let target = input.target()?;
        ctx.info(format!(
            "recording {} file(s) in {}",
            input.files.len(),
            target.snapshot_dir.display()
        ));
        let outcome = blocking(self.name(), move || {
            Ok(snapshot_actions::add_files(&target, &input.files, input.deleted)?)
        })
        .await?;
        Ok(serde_json::to_value(outcome)?)
    }
}

pub struct SnapshotRemove;

#[async_trait]
impl ServiceAction for SnapshotRemove {
    fn name(&self) -> &'static str {
        "snapshot-remove"
    }

    async fn execute(&self, input: Value, ctx: ActionContext) -> Result<Value, WorkerError> {
        let input: SnapshotInput = parse_input(self.name(), input)?;
        let target = input.target()?;
        let outcome = blocking(self.name(), move || {
            Ok(snapshot_actions::remove_files(&target, &input.files)?)
        })
        .await?;
        if !outcome.success {
            ctx.warn(outcome.message.clone());
        }
        Ok(serde_json::to_value(outcome)?)
    }
}

pub struct SnapshotShow;

#[async_trait]
impl ServiceAction for SnapshotShow {
    fn name(&self) -> &'static str {
        "snapshot-show"
    }

    async fn execute(&self, input: Value, ctx: ActionContext) -> Result<Value, WorkerError> {
        let input: SnapshotInput = parse_input(self.name(), input)?;
        let target = input.target()?;
        let manifest = blocking(self.name(), move || Ok(snapshot_actions::show(&target)?)).await?;
        match manifest {
            Some(manifest) => Ok(json!({ "found": true, "manifest": manifest })),
            None => {
                ctx.info("no snapshot");
                Ok(json!({ "found": false, "manifest": Value::Null }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_action_lists_registered_names() {
        let registry = ActionRegistry::with_defaults();
        let err = registry.get("sync-everything").err().expect("unknown");
        let message = err.to_string();
        assert!(message.contains("snapshot-add, snapshot-remove, snapshot-show"), "got: {message}");
    }

    #[test]
    fn snapshot_input_uses_camel_case() {
        let input: SnapshotInput = serde_json::from_value(json!({
            "project": "/p",
            "app": "web",
            "files": ["a.ts"],
            "snapshotDirectory": "snap"
        }))
        .unwrap();
        assert_eq!(input.snapshot_directory, Some(PathBuf::from("snap")));
        assert!(!input.deleted);
    }
}
