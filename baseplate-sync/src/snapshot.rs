//! Snapshot manifest: the durable record of added, modified and deleted
//! paths in `<snapshot dir>/manifest.json`.
//!
//! Updates are pure (`&self → Self`); only [`load`] and [`save`] touch disk.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{snapshot_io_err, SnapshotError};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedFile {
    pub path: String,
    /// Relative to the snapshot directory.
    pub diff_file: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFiles {
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub deleted: Vec<String>,
    #[serde(default)]
    pub modified: Vec<ModifiedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub version: u32,
    #[serde(default)]
    pub files: SnapshotFiles,
}

impl Default for SnapshotManifest {
    fn default() -> Self {
        initialize()
    }
}

/// An empty manifest at the current version.
pub fn initialize() -> SnapshotManifest {
    SnapshotManifest {
        version: MANIFEST_VERSION,
        files: SnapshotFiles::default(),
    }
}

impl SnapshotManifest {
    pub fn add_modified(&self, path: &str, diff_file: &str) -> Self {
        let mut next = self.remove_file(path);
        next.files.modified.push(ModifiedFile {
            path: path.to_string(),
            diff_file: diff_file.to_string(),
        });
        next
    }

    pub fn add_added(&self, path: &str) -> Self {
        let mut next = self.remove_file(path);
        next.files.added.push(path.to_string());
        next
    }

    pub fn add_deleted(&self, path: &str) -> Self {
        let mut next = self.remove_file(path);
        next.files.deleted.push(path.to_string());
        next
    }

    /// Drop `path` from every list.
    pub fn remove_file(&self, path: &str) -> Self {
        let mut next = self.clone();
        next.files.added.retain(|p| p != path);
        next.files.deleted.retain(|p| p != path);
        next.files.modified.retain(|m| m.path != path);
        next
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.added.iter().any(|p| p == path)
            || self.files.deleted.iter().any(|p| p == path)
            || self.files.modified.iter().any(|m| m.path == path)
    }

    pub fn modified_entry(&self, path: &str) -> Option<&ModifiedFile> {
        self.files.modified.iter().find(|m| m.path == path)
    }

    pub fn is_empty(&self) -> bool {
        self.files.added.is_empty() && self.files.deleted.is_empty() && self.files.modified.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.added.len() + self.files.deleted.len() + self.files.modified.len()
    }

    /// Lists sorted and de-duplicated.
    pub fn sorted(&self) -> Self {
        let mut next = self.clone();
        next.files.added.sort();
        next.files.added.dedup();
        next.files.deleted.sort();
        next.files.deleted.dedup();
        next.files.modified.sort_by(|a, b| a.path.cmp(&b.path));
        next.files.modified.dedup_by(|a, b| a.path == b.path);
        next
    }
}

pub fn manifest_path_at(snapshot_dir: &Path) -> PathBuf {
    snapshot_dir.join(MANIFEST_FILE)
}

/// `None` when no manifest has been saved yet.
pub fn load(snapshot_dir: &Path) -> Result<Option<SnapshotManifest>, SnapshotError> {
    let path = manifest_path_at(snapshot_dir);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(snapshot_io_err(&path, err)),
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| SnapshotError::Parse { path, source })
}

/// Atomically save `manifest` in sorted order.
pub fn save(snapshot_dir: &Path, manifest: &SnapshotManifest) -> Result<(), SnapshotError> {
    std::fs::create_dir_all(snapshot_dir).map_err(|e| snapshot_io_err(snapshot_dir, e))?;
    let path = manifest_path_at(snapshot_dir);
    let tmp = path.with_extension("json.tmp");

    let mut json = serde_json::to_string_pretty(&manifest.sorted())?;
    json.push('\n');
    std::fs::write(&tmp, json).map_err(|e| snapshot_io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(snapshot_io_err(&path, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_manifest_loads_as_none() {
        let tmp = TempDir::new().unwrap();
        assert!(load(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn save_load_roundtrip_is_sorted() {
        let tmp = TempDir::new().unwrap();
        let manifest = initialize()
            .add_added("z.txt")
            .add_added("a.txt")
            .add_modified("src/main.rs", "diffs/src/main.rs.diff")
            .add_modified("README.md", "diffs/README.md.diff")
            .add_deleted("old.txt");
        save(tmp.path(), &manifest).unwrap();
        let loaded = load(tmp.path()).unwrap().expect("manifest");
        assert_eq!(loaded, manifest.sorted());
        assert_eq!(loaded.files.added, vec!["a.txt", "z.txt"]);
        assert_eq!(loaded.files.modified[0].path, "README.md");
        assert!(!tmp.path().join("manifest.json.tmp").exists());
    }

    #[test]
    fn wire_format_uses_camel_case_diff_file() {
        let manifest = initialize().add_modified("a", "diffs/a.diff");
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["files"]["modified"][0]["diffFile"], "diffs/a.diff");
        assert!(json["files"]["added"].as_array().unwrap().is_empty());
    }

    #[test]
    fn adding_a_path_moves_it_between_lists() {
        let manifest = initialize().add_added("a").add_deleted("a");
        assert!(manifest.files.added.is_empty());
        assert_eq!(manifest.files.deleted, vec!["a"]);

        let twice = initialize().add_added("a").add_added("a");
        assert_eq!(twice.files.added, vec!["a"]);
    }

    #[test]
    fn remove_file_drops_every_entry() {
        let manifest = initialize().add_modified("a", "diffs/a.diff").remove_file("a");
        assert!(manifest.is_empty());
    }

    #[test]
    fn corrupt_manifest_is_a_parse_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(manifest_path_at(tmp.path()), "[]").unwrap();
        assert!(matches!(load(tmp.path()), Err(SnapshotError::Parse { .. })));
    }
}
