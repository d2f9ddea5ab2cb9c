//! Post-write commands: shell commands generators register to run once the
//! files are on disk (`pnpm install`, code generators, formatters).
//!
//! Commands run one at a time in priority order. A failing command is
//! reported and the rest still run.

use std::collections::HashSet;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use baseplate_core::PostWriteCommand;
use baseplate_generators::CancelSignal;
use serde::Serialize;
use tokio::process::Command;

/// Longest stderr tail kept in a failure report.
const STDERR_TAIL: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CommandStatus {
    Succeeded,
    Failed { code: Option<i32>, stderr: String },
    TimedOut { after_secs: u64 },
    /// None of its `only_if_changed` paths were written.
    Skipped,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub command: String,
    #[serde(flatten)]
    pub status: CommandStatus,
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, CommandStatus::Succeeded | CommandStatus::Skipped)
    }
}

/// Whether `command` should run given the paths `written` this pass.
pub fn should_run(command: &PostWriteCommand, written: &HashSet<String>) -> bool {
    command.only_if_changed.is_empty() || command.only_if_changed.iter().any(|path| written.contains(path))
}

/// Run `commands` (already sorted by priority) under `app_dir`.
pub async fn run_post_write_commands(
    app_dir: &Path,
    commands: &[PostWriteCommand],
    written: &HashSet<String>,
    default_timeout: Duration,
    cancel: &CancelSignal,
) -> Vec<CommandOutcome> {
    let mut outcomes = Vec::with_capacity(commands.len());
    for command in commands {
        let status = if cancel.is_cancelled() {
            CommandStatus::Cancelled
        } else if !should_run(command, written) {
            tracing::debug!(command = %command.command, "skipped; no trigger file changed");
            CommandStatus::Skipped
        } else {
            let timeout = command.timeout_secs.map(Duration::from_secs).unwrap_or(default_timeout);
            run_one(app_dir, command, timeout, cancel).await
        };
        outcomes.push(CommandOutcome {
            command: command.command.clone(),
            status,
        });
    }
    outcomes
}

async fn run_one(
    app_dir: &Path,
    command: &PostWriteCommand,
    timeout: Duration,
    cancel: &CancelSignal,
) -> CommandStatus {
    let directory = match &command.working_directory {
        Some(dir) => app_dir.join(dir),
        None => app_dir.to_path_buf(),
    };
    tracing::info!(command = %command.command, dir = %directory.display(), "running post-write command");

    let child = Command::new("sh")
        .arg("-c")
        .arg(&command.command)
        .current_dir(&directory)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();
    let child = match child {
        Ok(child) => child,
        Err(err) => {
            tracing::warn!(command = %command.command, error = %err, "failed to spawn");
            return CommandStatus::Failed {
                code: None,
                stderr: err.to_string(),
            };
        }
    };

    // Dropping the pending future kills the child.
    let output = tokio::select! {
        output = tokio::time::timeout(timeout, child.wait_with_output()) => output,
        _ = cancel.cancelled() => {
            tracing::warn!(command = %command.command, "cancelled");
            return CommandStatus::Cancelled;
        }
    };

    match output {
        Err(_) => {
            tracing::warn!(command = %command.command, secs = timeout.as_secs(), "timed out");
            CommandStatus::TimedOut {
                after_secs: timeout.as_secs(),
            }
        }
        Ok(Err(err)) => CommandStatus::Failed {
            code: None,
            stderr: err.to_string(),
        },
        Ok(Ok(output)) if output.status.success() => CommandStatus::Succeeded,
        Ok(Ok(output)) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let start = stderr.len().saturating_sub(STDERR_TAIL);
            let start = (start..stderr.len()).find(|i| stderr.is_char_boundary(*i)).unwrap_or(stderr.len());
            tracing::warn!(command = %command.command, status = %output.status, "post-write command failed");
            CommandStatus::Failed {
                code: output.status.code(),
                stderr: stderr[start..].trim_end().to_string(),
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use baseplate_generators::cancel_pair;
    use tempfile::TempDir;

    fn written(paths: &[&str]) -> HashSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[tokio::test]
    async fn runs_in_app_directory_and_reports_failures() {
        let app = TempDir::new().unwrap();
        std::fs::create_dir(app.path().join("pkg")).unwrap();
        let commands = vec![
            PostWriteCommand::new("touch marker").in_directory("pkg"),
            PostWriteCommand::new("echo broken >&2; exit 3"),
            PostWriteCommand::new("touch after"),
        ];
        let outcomes = run_post_write_commands(
            app.path(),
            &commands,
            &written(&[]),
            Duration::from_secs(30),
            &CancelSignal::never(),
        )
        .await;

        assert!(app.path().join("pkg/marker").exists());
        assert_eq!(
            outcomes[1].status,
            CommandStatus::Failed {
                code: Some(3),
                stderr: "broken".into()
            }
        );
        assert_eq!(outcomes[2].status, CommandStatus::Succeeded);
        assert!(app.path().join("after").exists());
    }

    #[tokio::test]
    async fn only_if_changed_gates_on_written_paths() {
        let app = TempDir::new().unwrap();
        let commands = vec![
            PostWriteCommand::new("touch installed").only_if_changed(["package.json"]),
            PostWriteCommand::new("touch formatted").only_if_changed(["src/a.ts"]),
        ];
        let outcomes = run_post_write_commands(
            app.path(),
            &commands,
            &written(&["src/a.ts"]),
            Duration::from_secs(30),
            &CancelSignal::never(),
        )
        .await;
        assert_eq!(outcomes[0].status, CommandStatus::Skipped);
        assert!(!app.path().join("installed").exists());
        assert!(app.path().join("formatted").exists());
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let app = TempDir::new().unwrap();
        let commands = vec![PostWriteCommand::new("sleep 5").timeout_secs(1)];
        let outcomes = run_post_write_commands(
            app.path(),
            &commands,
            &written(&[]),
            Duration::from_secs(30),
            &CancelSignal::never(),
        )
        .await;
        assert_eq!(outcomes[0].status, CommandStatus::TimedOut { after_secs: 1 });
    }

    #[tokio::test]
    async fn cancelled_signal_skips_remaining_commands() {
        let app = TempDir::new().unwrap();
        let (handle, signal) = cancel_pair();
        handle.cancel();
        let outcomes = run_post_write_commands(
            app.path(),
            &[PostWriteCommand::new("touch never")],
            &written(&[]),
            Duration::from_secs(30),
            &signal,
        )
        .await;
        assert_eq!(outcomes[0].status, CommandStatus::Cancelled);
        assert!(!app.path().join("never").exists());
    }

    #[test]
    fn outcome_serializes_status_inline() {
        let outcome = CommandOutcome {
            command: "pnpm install".into(),
            status: CommandStatus::TimedOut { after_secs: 3 },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "timedOut");
        assert_eq!(json["after_secs"], 3);
    }
}
