//! # baseplate-sync
//!
//! Merge-aware sync of generated output into an app directory.
//!
//! [`sync_app`] runs a generator bundle, plans every file against the
//! previous generation and the working copy ([`prepare`], [`merge`]),
//! applies the plan ([`writer`]), deletes what the generator dropped
//! ([`reconcile`]) and records the new baseline ([`payload`]). Snapshots
//! ([`snapshot`], [`snapshot_actions`]) capture user edits as diffs against
//! that baseline.

pub mod commands;
pub mod diff;
pub mod error;
pub mod merge;
pub mod patch;
pub mod payload;
pub mod pipeline;
pub mod prepare;
pub mod reconcile;
pub mod snapshot;
pub mod snapshot_actions;
pub mod writer;

pub use commands::{run_post_write_commands, CommandOutcome, CommandStatus};
pub use diff::{diff_app, format_datetime_age, status_app, AppStatus, FileDiff, FileState, FileStatus};
pub use error::{BatchWriteError, FileWriteError, PatchError, SnapshotError, SyncError};
pub use merge::{merge, merge_lines, JsonMerge, LineMerge, MergeResult, MergeStrategies, MergeStrategy};
pub use patch::{apply_unified_diff, create_unified_diff};
pub use payload::{GeneratedPayload, PayloadEntry, PayloadRecord};
pub use pipeline::{sync_app, RenamedFile, SyncRequest, SyncResult};
pub use prepare::{prepare_operations, FileOperationResult};
pub use reconcile::{reconcile_deletions, ReconcileOptions, ReconcileResult};
pub use snapshot::{ModifiedFile, SnapshotFiles, SnapshotManifest};
pub use snapshot_actions::{SnapshotAddOutcome, SnapshotRemoveOutcome, SnapshotTarget};
pub use writer::{atomic_write, write_operations, FileWriteOutcome, WriteStatus, WriterOptions};
