//! Read-only views of an app against its last generation: unified diffs of
//! working copies and a per-file drift status.

use std::path::Path;

use baseplate_core::{FileId, SyncSettings};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SyncError;
use crate::patch::create_unified_diff;
use crate::payload::{self, read_optional, sha256_hex};

/// A single working-copy diff against the baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub relative_path: String,
    pub unified_diff: String,
}

/// Diff every previously generated file against its working copy.
///
/// Headers read `a/<path>` (generated) and `b/<path>` (working). A deleted
/// working copy diffs against empty; unchanged and non-text files produce
/// nothing.
pub fn diff_app(app_dir: &Path, settings: &SyncSettings) -> Result<Vec<FileDiff>, SyncError> {
    let state_dir = app_dir.join(&settings.state_directory);
    let Some(payload) = payload::load_at(&state_dir)? else {
        return Ok(Vec::new());
    };

    let mut diffs = Vec::new();
    for entry in payload.files.values() {
        let Some(baseline) = payload.read_generated(&entry.path)? else {
            continue;
        };
        let working = read_optional(&app_dir.join(&entry.path))?.unwrap_or_default();
        if working == baseline {
            continue;
        }
        let (Ok(old), Ok(new)) = (std::str::from_utf8(&baseline), std::str::from_utf8(&working)) else {
            tracing::debug!(path = %entry.path, "skipping non-text diff");
            continue;
        };
        let unified_diff = create_unified_diff(
            &normalize_line_endings(old),
            &normalize_line_endings(new),
            &format!("a/{}", entry.path),
            &format!("b/{}", entry.path),
        );
        if unified_diff.is_empty() {
            continue;
        }
        diffs.push(FileDiff {
            relative_path: entry.path.clone(),
            unified_diff,
        });
    }
    diffs.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(diffs)
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n")
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    Clean,
    Modified,
    Missing,
    /// Legacy entry with no recorded hash and no baseline copy.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStatus {
    pub id: FileId,
    pub path: String,
    pub state: FileState,
}

/// Drift classification for an app.
///
/// Precedence: `NeverGenerated`, then `Drifted` when any file is modified,
/// missing or unknown, then `Current`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum AppStatus {
    NeverGenerated,
    Current {
        generated_at: Option<DateTime<Utc>>,
        files: Vec<FileStatus>,
    },
    Drifted {
        generated_at: Option<DateTime<Utc>>,
        files: Vec<FileStatus>,
    },
}

impl AppStatus {
    pub fn files(&self) -> &[FileStatus] {
        match self {
            AppStatus::NeverGenerated => &[],
            AppStatus::Current { files, .. } | AppStatus::Drifted { files, .. } => files,
        }
    }
}

pub fn status_app(app_dir: &Path, settings: &SyncSettings) -> Result<AppStatus, SyncError> {
    let state_dir = app_dir.join(&settings.state_directory);
    let Some(payload) = payload::load_at(&state_dir)? else {
        return Ok(AppStatus::NeverGenerated);
    };
    if payload.files.is_empty() {
        return Ok(AppStatus::NeverGenerated);
    }

    let mut files = Vec::with_capacity(payload.files.len());
    for (id, entry) in &payload.files {
        let state = match read_optional(&app_dir.join(&entry.path))? {
            None => FileState::Missing,
            Some(working) => match &entry.hash {
                Some(hash) if *hash == sha256_hex(&working) => FileState::Clean,
                Some(_) => FileState::Modified,
                None => match payload.read_generated(&entry.path)? {
                    Some(baseline) if baseline == working => FileState::Clean,
                    Some(_) => FileState::Modified,
                    None => FileState::Unknown,
                },
            },
        };
        files.push(FileStatus {
            id: id.clone(),
            path: entry.path.clone(),
            state,
        });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));

    let generated_at = payload.generated_at;
    if files.iter().all(|f| f.state == FileState::Clean) {
        Ok(AppStatus::Current { generated_at, files })
    } else {
        Ok(AppStatus::Drifted { generated_at, files })
    }
}

/// Format age from a chrono timestamp (`3m`, `2h`, `5d`).
pub fn format_datetime_age(timestamp: DateTime<Utc>) -> String {
    let seconds = Utc::now().signed_duration_since(timestamp).num_seconds().max(0) as u64;
    format_seconds(seconds)
}

fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
