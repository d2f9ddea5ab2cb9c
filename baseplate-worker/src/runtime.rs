//! Isolated action runs: one task per action, a hard timeout, cancellation,
//! and a log channel forwarded to the caller.

use std::sync::Arc;
use std::time::Duration;

use baseplate_core::WorkerSettings;
use baseplate_generators::CancelSignal;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::actions::{ActionContext, ActionRegistry, ServiceAction};
use crate::error::{io_err, WorkerError};
use crate::protocol::{ActionRequest, ActionResponse, LogLevel, LogRecord};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub timeout: Duration,
    pub cancel: CancelSignal,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            cancel: CancelSignal::never(),
        }
    }
}

impl RunOptions {
    pub fn from_settings(settings: &WorkerSettings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.timeout_secs),
            ..Self::default()
        }
    }
}

/// Data returned by a finished action plus every log line it emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub data: Value,
    pub logs: Vec<LogRecord>,
}

/// Run `action` with `input` on its own task.
///
/// The task is aborted on timeout, on cancellation, and once its result has
/// arrived. Blocking work an action already handed to `spawn_blocking`
/// finishes in the background.
pub async fn run_isolated(
    action: Arc<dyn ServiceAction>,
    input: Value,
    options: &RunOptions,
) -> Result<ActionOutcome, WorkerError> {
    let name = action.name();
    let (log_tx, mut log_rx) = mpsc::unbounded_channel::<LogRecord>();
    let (result_tx, mut result_rx) = oneshot::channel::<Result<Value, WorkerError>>();
    let ctx = ActionContext::new(log_tx, options.cancel.clone());

    let mut handle = tokio::spawn(async move {
        let result = action.execute(input, ctx).await;
        let _ = result_tx.send(result);
    });
    tracing::debug!(action = name, timeout_secs = options.timeout.as_secs(), "action started");

    let deadline = tokio::time::sleep(options.timeout);
    tokio::pin!(deadline);
    let mut logs = Vec::new();

    let result = loop {
        tokio::select! {
            biased;
            Some(record) = log_rx.recv() => {
                forward(name, &record);
                logs.push(record);
            }
            result = &mut result_rx => {
                break match result {
                    Ok(result) => result,
                    Err(_) => Err(WorkerError::Join {
                        action: name.to_string(),
                        message: match (&mut handle).await {
                            Err(err) if err.is_panic() => "action panicked".to_string(),
                            Err(err) => err.to_string(),
                            Ok(()) => "action ended without a result".to_string(),
                        },
                    }),
                };
            }
            _ = &mut deadline => {
                tracing::warn!(action = name, "action timed out, aborting");
                break Err(WorkerError::Timeout {
                    action: name.to_string(),
                    secs: options.timeout.as_secs(),
                });
            }
            _ = options.cancel.cancelled() => {
                tracing::warn!(action = name, "action cancelled, aborting");
                break Err(WorkerError::Cancelled { action: name.to_string() });
            }
        }
    };
    handle.abort();

    while let Ok(record) = log_rx.try_recv() {
        forward(name, &record);
        logs.push(record);
    }
    let data = result?;
    tracing::debug!(action = name, logs = logs.len(), "action finished");
    Ok(ActionOutcome { data, logs })
}

fn forward(action: &str, record: &LogRecord) {
    match record.level {
        LogLevel::Debug => tracing::debug!(action, "{}", record.message),
        LogLevel::Info => tracing::info!(action, "{}", record.message),
        LogLevel::Warn => tracing::warn!(action, "{}", record.message),
        LogLevel::Error => tracing::error!(action, "{}", record.message),
    }
}

/// Look up `request.action` in `registry` and run it isolated.
pub async fn dispatch(registry: &ActionRegistry, request: ActionRequest, options: &RunOptions) -> ActionResponse {
    let result = match registry.get(&request.action) {
        Ok(action) => run_isolated(action, request.input, options).await,
        Err(err) => Err(err),
    };
    if let Err(err) = &result {
        tracing::warn!(action = %request.action, error = %err, "action failed");
    }
    ActionResponse::from(result)
}

/// Run `request` against the default registry on a fresh multi-threaded
/// runtime, blocking the current thread.
pub fn dispatch_blocking(request: ActionRequest, options: RunOptions) -> Result<ActionResponse, WorkerError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    let registry = ActionRegistry::with_defaults();
    Ok(runtime.block_on(dispatch(&registry, request, &options)))
}

/// Install the global subscriber on stderr. `BASEPLATE_LOG_FORMAT=json`
/// switches to one JSON object per line.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = match std::env::var("BASEPLATE_LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().try_init(),
        _ => builder.try_init(),
    };
}
