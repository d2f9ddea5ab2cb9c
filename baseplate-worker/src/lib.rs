//! Action worker: runs named service actions in isolation with a timeout,
//! cancellation and captured logs, answering with a JSON envelope.

pub mod actions;
mod error;
pub mod protocol;
pub mod runtime;

pub use actions::{ActionContext, ActionRegistry, ServiceAction, SnapshotInput};
pub use error::WorkerError;
pub use protocol::{ActionRequest, ActionResponse, LogLevel, LogRecord};
pub use runtime::{dispatch, dispatch_blocking, init_tracing, run_isolated, ActionOutcome, RunOptions};
