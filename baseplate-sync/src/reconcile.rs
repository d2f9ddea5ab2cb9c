//! Deletion reconciliation for files the generator stopped emitting.
//!
//! A file is deleted only when its working copy still equals what was last
//! generated. Edited files are left in place and reported as pending delete.
//! Directories emptied along the way are removed up to (not including) the
//! app root.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::ErrorKind;
use std::path::Path;

use baseplate_core::FileId;
use serde::Serialize;

use crate::error::{io_err, SyncError};
use crate::payload::{read_optional, sha256_hex, GeneratedPayload};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResult {
    pub deleted_relative_paths: Vec<String>,
    /// Working copies that diverged from their baseline and were kept.
    pub relative_paths_pending_delete: Vec<String>,
    pub removed_directories: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions<'a> {
    /// A directory holding one of these is never considered empty.
    pub metadata_files: &'a [String],
    /// Ignored (and removed) when deciding whether a directory is empty.
    pub disposable_files: &'a [String],
    /// Report what would happen without touching the disk.
    pub dry_run: bool,
}

/// Delete files of `previous` that no id in `current` still owns.
///
/// `vacated` lists paths moved away by renames this pass; their parent
/// directories are cleaned up like those of deleted files.
pub fn reconcile_deletions(
    app_dir: &Path,
    previous: &GeneratedPayload,
    current: &BTreeMap<FileId, String>,
    vacated: &[String],
    options: ReconcileOptions<'_>,
) -> Result<ReconcileResult, SyncError> {
    let owned: HashSet<&str> = current.values().map(String::as_str).collect();
    let mut result = ReconcileResult::default();

    for (id, entry) in &previous.files {
        if current.contains_key(id) || owned.contains(entry.path.as_str()) {
            continue;
        }
        let path = app_dir.join(&entry.path);
        let Some(working) = read_optional(&path)? else {
            tracing::debug!(path = %entry.path, "removed file already gone");
            continue;
        };
        let unmodified = match previous.read_generated(&entry.path)? {
            Some(baseline) => baseline == working,
            None => entry.hash.as_deref() == Some(sha256_hex(&working).as_str()),
        };
        if !unmodified {
            tracing::warn!(path = %entry.path, "no longer generated but modified; keeping it");
            result.relative_paths_pending_delete.push(entry.path.clone());
            continue;
        }
        if !options.dry_run {
            std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
            tracing::info!(path = %entry.path, "deleted");
        }
        result.deleted_relative_paths.push(entry.path.clone());
    }

    if !options.dry_run {
        let candidates = result
            .deleted_relative_paths
            .iter()
            .chain(vacated)
            .map(String::as_str);
        result.removed_directories = remove_empty_parents(app_dir, candidates, options)?;
    }
    result.deleted_relative_paths.sort();
    result.relative_paths_pending_delete.sort();
    Ok(result)
}

fn remove_empty_parents<'a>(
    app_dir: &Path,
    paths: impl Iterator<Item = &'a str>,
    options: ReconcileOptions<'_>,
) -> Result<Vec<String>, SyncError> {
    let mut directories = BTreeSet::new();
    for path in paths {
        let mut parent = Path::new(path).parent();
        while let Some(dir) = parent.filter(|dir| !dir.as_os_str().is_empty()) {
            directories.insert(dir.to_path_buf());
            parent = dir.parent();
        }
    }

    // Deepest first, so a parent is only judged after its children.
    let mut ordered: Vec<_> = directories.into_iter().collect();
    ordered.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));

    let mut removed = Vec::new();
    for relative in ordered {
        let dir = app_dir.join(&relative);
        if !remove_if_empty(&dir, options)? {
            continue;
        }
        let relative = relative.to_string_lossy().replace('\\', "/");
        tracing::debug!(dir = %relative, "removed empty directory");
        removed.push(relative);
    }
    removed.sort();
    Ok(removed)
}

fn remove_if_empty(dir: &Path, options: ReconcileOptions<'_>) -> Result<bool, SyncError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(io_err(dir, err)),
    };
    let mut disposable = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        let is_file = entry.file_type().map_err(|e| io_err(entry.path(), e))?.is_file();
        if !is_file || options.metadata_files.contains(&name) || !options.disposable_files.contains(&name) {
            return Ok(false);
        }
        disposable.push(entry.path());
    }
    for file in disposable {
        std::fs::remove_file(&file).map_err(|e| io_err(&file, e))?;
    }
    std::fs::remove_dir(dir).map_err(|e| io_err(dir, e))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{load_at, save_at, PayloadRecord};
    use std::fs;
    use tempfile::TempDir;

    fn setup(records: &[(&str, &str, &str)]) -> (TempDir, GeneratedPayload) {
        let app = TempDir::new().unwrap();
        let records: Vec<_> = records
            .iter()
            .map(|(id, path, contents)| {
                let full = app.path().join(path);
                fs::create_dir_all(full.parent().unwrap()).unwrap();
                fs::write(&full, contents).unwrap();
                PayloadRecord::new(FileId::from(*id), *path, contents.as_bytes().to_vec())
            })
            .collect();
        let state = app.path().join(".baseplate");
        save_at(&state, &records).unwrap();
        let payload = load_at(&state).unwrap().unwrap();
        (app, payload)
    }

    fn settings() -> (Vec<String>, Vec<String>) {
        (vec![".gitkeep".to_string()], vec![".DS_Store".to_string()])
    }

    #[test]
    fn unmodified_removed_file_is_deleted_with_its_directory() {
        let (app, payload) = setup(&[("a", "lib/old/a.ts", "a"), ("b", "b.ts", "b")]);
        fs::write(app.path().join("lib/old/.DS_Store"), "junk").unwrap();
        let current = BTreeMap::from([(FileId::from("b"), "b.ts".to_string())]);
        let (metadata, disposable) = settings();

        let result = reconcile_deletions(
            app.path(),
            &payload,
            &current,
            &[],
            ReconcileOptions {
                metadata_files: &metadata,
                disposable_files: &disposable,
                dry_run: false,
            },
        )
        .unwrap();

        assert_eq!(result.deleted_relative_paths, vec!["lib/old/a.ts"]);
        assert_eq!(result.removed_directories, vec!["lib", "lib/old"]);
        assert!(!app.path().join("lib").exists());
        assert!(app.path().join("b.ts").exists());
    }

    #[test]
    fn modified_removed_file_is_pending_delete() {
        let (app, payload) = setup(&[("a", "a.ts", "generated")]);
        fs::write(app.path().join("a.ts"), "edited").unwrap();

        let result =
            reconcile_deletions(app.path(), &payload, &BTreeMap::new(), &[], ReconcileOptions::default()).unwrap();

        assert!(result.deleted_relative_paths.is_empty());
        assert_eq!(result.relative_paths_pending_delete, vec!["a.ts"]);
        assert!(app.path().join("a.ts").exists());
    }

    #[test]
    fn metadata_file_keeps_directory() {
        let (app, payload) = setup(&[("a", "keep/a.ts", "a")]);
        fs::write(app.path().join("keep/.gitkeep"), "").unwrap();
        let (metadata, disposable) = settings();

        let result = reconcile_deletions(
            app.path(),
            &payload,
            &BTreeMap::new(),
            &[],
            ReconcileOptions {
                metadata_files: &metadata,
                disposable_files: &disposable,
                dry_run: false,
            },
        )
        .unwrap();

        assert_eq!(result.deleted_relative_paths, vec!["keep/a.ts"]);
        assert!(result.removed_directories.is_empty());
        assert!(app.path().join("keep/.gitkeep").exists());
    }

    #[test]
    fn path_taken_over_by_another_id_is_not_deleted() {
        let (app, payload) = setup(&[("old-id", "shared.ts", "x")]);
        let current = BTreeMap::from([(FileId::from("new-id"), "shared.ts".to_string())]);
        let result =
            reconcile_deletions(app.path(), &payload, &current, &[], ReconcileOptions::default()).unwrap();
        assert!(result.deleted_relative_paths.is_empty());
        assert!(app.path().join("shared.ts").exists());
    }

    #[test]
    fn dry_run_reports_without_deleting() {
        let (app, payload) = setup(&[("a", "dir/a.ts", "a")]);
        let options = ReconcileOptions {
            dry_run: true,
            ..Default::default()
        };
        let result = reconcile_deletions(app.path(), &payload, &BTreeMap::new(), &[], options).unwrap();
        assert_eq!(result.deleted_relative_paths, vec!["dir/a.ts"]);
        assert!(app.path().join("dir/a.ts").exists());
        assert!(result.removed_directories.is_empty());
    }

    #[test]
    fn missing_baseline_copy_falls_back_to_hash() {
        let (app, payload) = setup(&[("a", "a.ts", "same"), ("b", "b.ts", "orig")]);
        fs::remove_dir_all(app.path().join(".baseplate/generated")).unwrap();
        fs::write(app.path().join("b.ts"), "changed").unwrap();

        let result =
            reconcile_deletions(app.path(), &payload, &BTreeMap::new(), &[], ReconcileOptions::default()).unwrap();
        assert_eq!(result.deleted_relative_paths, vec!["a.ts"]);
        assert_eq!(result.relative_paths_pending_delete, vec!["b.ts"]);
    }

    #[test]
    fn vacated_rename_source_directory_is_cleaned() {
        let (app, payload) = setup(&[("x", "y.ts", "x")]);
        fs::create_dir_all(app.path().join("old/nested")).unwrap();
        let current = BTreeMap::from([(FileId::from("x"), "y.ts".to_string())]);
        let result = reconcile_deletions(
            app.path(),
            &payload,
            &current,
            &["old/nested/x.ts".to_string()],
            ReconcileOptions::default(),
        )
        .unwrap();
        assert_eq!(result.removed_directories, vec!["old", "old/nested"]);
    }
}
