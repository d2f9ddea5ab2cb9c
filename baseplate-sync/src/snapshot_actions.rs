//! `snapshot add / remove / show` and applying a snapshot to generator output.
//!
//! Artifacts live next to the manifest: unified diffs (baseline → working)
//! under `diffs/<path>.diff` and whole copies of user-added files under
//! `added/<path>`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use baseplate_core::{FileId, SyncSettings, VirtualFile};
use baseplate_generators::{normalize_relative_path, GeneratorOutput};
use serde::Serialize;

use crate::error::{snapshot_io_err, SnapshotError};
use crate::patch::{apply_unified_diff, create_unified_diff};
use crate::payload::generated_dir_at;
use crate::snapshot::{self, SnapshotManifest};

const DIFFS_DIR: &str = "diffs";
const ADDED_DIR: &str = "added";

/// Directories a snapshot action works on, all absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotTarget {
    pub app_dir: PathBuf,
    pub snapshot_dir: PathBuf,
    pub state_dir: PathBuf,
}

impl SnapshotTarget {
    /// Resolve the settings' directories against `app_dir`. An explicit
    /// `snapshot_dir` overrides the configured one.
    pub fn new(app_dir: impl Into<PathBuf>, settings: &SyncSettings, snapshot_dir: Option<&Path>) -> Self {
        let app_dir = app_dir.into();
        let snapshot_dir = app_dir.join(snapshot_dir.unwrap_or(settings.snapshot_directory.as_path()));
        let state_dir = app_dir.join(&settings.state_directory);
        Self {
            app_dir,
            snapshot_dir,
            state_dir,
        }
    }

    fn baseline_path(&self, relative: &str) -> PathBuf {
        generated_dir_at(&self.state_dir).join(relative)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotAddOutcome {
    pub success: bool,
    pub message: String,
    /// Number of files recorded.
    pub files_added: usize,
    /// The recorded paths, normalized.
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRemoveOutcome {
    pub success: bool,
    pub message: String,
    pub files_removed: usize,
    pub paths: Vec<String>,
}

fn diff_file_for(relative: &str) -> String {
    format!("{DIFFS_DIR}/{relative}.diff")
}

fn added_file_for(relative: &str) -> String {
    format!("{ADDED_DIR}/{relative}")
}

/// Record `files` (relative to the app) in the snapshot.
pub fn add_files(
    target: &SnapshotTarget,
    files: &[String],
    deleted: bool,
) -> Result<SnapshotAddOutcome, SnapshotError> {
    let mut manifest = snapshot::load(&target.snapshot_dir)?.unwrap_or_else(snapshot::initialize);
    let mut paths = Vec::new();

    for file in files {
        let relative = normalize_relative_path(file)?;
        if deleted {
            remove_artifacts(target, &relative)?;
            manifest = manifest.add_deleted(&relative);
            paths.push(relative);
            continue;
        }

        let working_path = target.app_dir.join(&relative);
        let working = match std::fs::read(&working_path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(SnapshotError::FileNotFound { path: relative })
            }
            Err(err) => return Err(snapshot_io_err(&working_path, err)),
        };

        let baseline_path = target.baseline_path(&relative);
        match read_optional(&baseline_path)? {
            Some(baseline) => {
                if baseline == working {
                    tracing::info!(path = %relative, "file matches the generated baseline, nothing to record");
                    continue;
                }
                let old = as_text(&relative, &baseline)?;
                let new = as_text(&relative, &working)?;
                let diff = create_unified_diff(
                    old,
                    new,
                    &format!("a/{relative}"),
                    &format!("b/{relative}"),
                );
                let diff_file = diff_file_for(&relative);
                remove_artifacts(target, &relative)?;
                write_artifact(&target.snapshot_dir.join(&diff_file), diff.as_bytes())?;
                manifest = manifest.add_modified(&relative, &diff_file);
            }
            None => {
                remove_artifacts(target, &relative)?;
                write_artifact(&target.snapshot_dir.join(added_file_for(&relative)), &working)?;
                manifest = manifest.add_added(&relative);
            }
        }
        paths.push(relative);
    }

    snapshot::save(&target.snapshot_dir, &manifest)?;
    tracing::info!(files = paths.len(), snapshot_dir = %target.snapshot_dir.display(), "snapshot updated");
    Ok(SnapshotAddOutcome {
        success: true,
        message: format!("Added {} file(s) to snapshot", paths.len()),
        files_added: paths.len(),
        paths,
    })
}

/// Drop `files` and their stored artifacts from the snapshot.
pub fn remove_files(target: &SnapshotTarget, files: &[String]) -> Result<SnapshotRemoveOutcome, SnapshotError> {
    let Some(mut manifest) = snapshot::load(&target.snapshot_dir)? else {
        return Ok(SnapshotRemoveOutcome {
            success: true,
            message: "No snapshot found".to_string(),
            files_removed: 0,
            paths: Vec::new(),
        });
    };

    let mut paths = Vec::new();
    for file in files {
        let relative = normalize_relative_path(file)?;
        if !manifest.contains(&relative) {
            tracing::debug!(path = %relative, "not in snapshot");
            continue;
        }
        remove_artifacts(target, &relative)?;
        manifest = manifest.remove_file(&relative);
        paths.push(relative);
    }

    snapshot::save(&target.snapshot_dir, &manifest)?;
    Ok(SnapshotRemoveOutcome {
        success: true,
        message: format!("Removed {} file(s) from snapshot", paths.len()),
        files_removed: paths.len(),
        paths,
    })
}

pub fn show(target: &SnapshotTarget) -> Result<Option<SnapshotManifest>, SnapshotError> {
    snapshot::load(&target.snapshot_dir)
}

/// Apply the snapshot in `snapshot_dir` to `output` in memory: patch
/// modified files, inject added files, drop deleted ones.
pub fn apply_snapshot(output: &GeneratorOutput, snapshot_dir: &Path) -> Result<GeneratorOutput, SnapshotError> {
    let mut next = output.clone();
    let Some(manifest) = snapshot::load(snapshot_dir)? else {
        return Ok(next);
    };

    for modified in &manifest.files.modified {
        let file = next
            .files
            .get_mut(&modified.path)
            .ok_or_else(|| SnapshotError::MissingTarget {
                path: modified.path.clone(),
            })?;
        let diff_path = snapshot_dir.join(&modified.diff_file);
        let diff = std::fs::read_to_string(&diff_path).map_err(|e| snapshot_io_err(&diff_path, e))?;
        let original = as_text(&modified.path, &file.contents)?;
        let patched = apply_unified_diff(original, &diff).map_err(|source| SnapshotError::Patch {
            path: modified.path.clone(),
            source,
        })?;
        file.contents = patched.into_bytes();
    }

    for added in &manifest.files.added {
        let added_path = snapshot_dir.join(added_file_for(added));
        let contents = std::fs::read(&added_path).map_err(|e| snapshot_io_err(&added_path, e))?;
        match next.files.get_mut(added) {
            Some(existing) => existing.contents = contents,
            None => {
                next.files.insert(
                    added.clone(),
                    VirtualFile::new(FileId(format!("snapshot:{added}")), added.clone(), contents),
                );
            }
        }
    }

    for deleted in &manifest.files.deleted {
        next.files.remove(deleted);
    }
    Ok(next)
}

fn as_text<'a>(path: &str, bytes: &'a [u8]) -> Result<&'a str, SnapshotError> {
    std::str::from_utf8(bytes).map_err(|_| SnapshotError::NotText {
        path: path.to_string(),
    })
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, SnapshotError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(snapshot_io_err(path, err)),
    }
}

fn write_artifact(path: &Path, contents: &[u8]) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| snapshot_io_err(parent, e))?;
    }
    std::fs::write(path, contents).map_err(|e| snapshot_io_err(path, e))
}

fn remove_artifacts(target: &SnapshotTarget, relative: &str) -> Result<(), SnapshotError> {
    for artifact in [diff_file_for(relative), added_file_for(relative)] {
        let path = target.snapshot_dir.join(artifact);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(snapshot_io_err(&path, err)),
        }
    }
    Ok(())
}
