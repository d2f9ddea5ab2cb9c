//! Generated payload store: the previous pass's file-id map and generated
//! contents.
//!
//! Layout under the app's state directory (default `.baseplate/`):
//!
//! ```text
//! file-id-map.json     {"version":1,"generated_at":..,"files":{"<id>":{"path":..,"hash":..}}}
//! generated/<path>     generated contents of the last pass
//! ```
//!
//! The map is written through a `.tmp` sibling and a rename; the generated
//! tree is staged in `generated.next/` and swapped in, so a crash leaves
//! either the old baseline or the new one.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use baseplate_core::FileId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{io_err, SyncError};

pub const FILE_ID_MAP: &str = "file-id-map.json";
pub const GENERATED_DIR: &str = "generated";
const PAYLOAD_VERSION: u32 = 1;

/// SHA-256 of `bytes` as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// One previously generated file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadEntry {
    pub path: String,
    /// Absent for entries migrated from the legacy flat map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileIdMapFile {
    version: u32,
    generated_at: DateTime<Utc>,
    files: BTreeMap<FileId, PayloadEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FileIdMapCompat {
    Structured(FileIdMapStructuredCompat),
    Legacy(BTreeMap<FileId, String>),
}

#[derive(Debug, Deserialize)]
struct FileIdMapStructuredCompat {
    #[allow(dead_code)]
    version: Option<u32>,
    generated_at: Option<DateTime<Utc>>,
    files: BTreeMap<FileId, PayloadEntry>,
}

/// The previous generation, read-only during a pass.
#[derive(Debug, Clone)]
pub struct GeneratedPayload {
    state_dir: PathBuf,
    pub generated_at: Option<DateTime<Utc>>,
    pub files: BTreeMap<FileId, PayloadEntry>,
    by_path: HashMap<String, FileId>,
}

impl GeneratedPayload {
    pub fn new(
        state_dir: impl Into<PathBuf>,
        generated_at: Option<DateTime<Utc>>,
        files: BTreeMap<FileId, PayloadEntry>,
    ) -> Self {
        let by_path = files
            .iter()
            .map(|(id, entry)| (entry.path.clone(), id.clone()))
            .collect();
        Self {
            state_dir: state_dir.into(),
            generated_at,
            files,
            by_path,
        }
    }

    pub fn entry(&self, id: &FileId) -> Option<&PayloadEntry> {
        self.files.get(id)
    }

    /// The id that owned `relative_path` in the previous pass.
    pub fn owner_of(&self, relative_path: &str) -> Option<&FileId> {
        self.by_path.get(relative_path)
    }

    pub fn file_id_map(&self) -> BTreeMap<FileId, String> {
        self.files
            .iter()
            .map(|(id, entry)| (id.clone(), entry.path.clone()))
            .collect()
    }

    pub fn generated_path(&self, relative_path: &str) -> PathBuf {
        generated_dir_at(&self.state_dir).join(relative_path)
    }

    /// Previously generated bytes of `relative_path`, `None` when the
    /// baseline copy is missing.
    pub fn read_generated(&self, relative_path: &str) -> Result<Option<Vec<u8>>, SyncError> {
        read_optional(&self.generated_path(relative_path))
    }
}

/// A file to record in the next baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadRecord {
    pub id: FileId,
    pub path: String,
    pub hash: Option<String>,
    /// `None` records the id and hash without a generated copy.
    pub contents: Option<Vec<u8>>,
}

impl PayloadRecord {
    pub fn new(id: FileId, path: impl Into<String>, contents: Vec<u8>) -> Self {
        Self {
            id,
            path: path.into(),
            hash: Some(sha256_hex(&contents)),
            contents: Some(contents),
        }
    }
}

pub fn file_id_map_path_at(state_dir: &Path) -> PathBuf {
    state_dir.join(FILE_ID_MAP)
}

pub fn generated_dir_at(state_dir: &Path) -> PathBuf {
    state_dir.join(GENERATED_DIR)
}

/// Load the payload from `state_dir`; `None` before the first generation.
pub fn load_at(state_dir: &Path) -> Result<Option<GeneratedPayload>, SyncError> {
    let path = file_id_map_path_at(state_dir);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(&path, err)),
    };
    let parsed: FileIdMapCompat = serde_json::from_str(&contents)
        .map_err(|source| SyncError::Parse {
            path: path.clone(),
            source,
        })?;
    let payload = match parsed {
        FileIdMapCompat::Structured(map) => {
            GeneratedPayload::new(state_dir, map.generated_at, map.files)
        }
        FileIdMapCompat::Legacy(flat) => {
            tracing::debug!(path = %path.display(), "migrating legacy file-id map");
            let files = flat
                .into_iter()
                .map(|(id, path)| (id, PayloadEntry { path, hash: None }))
                .collect();
            GeneratedPayload::new(state_dir, None, files)
        }
    };
    Ok(Some(payload))
}

/// Replace the payload in `state_dir` with `records`.
pub fn save_at(state_dir: &Path, records: &[PayloadRecord]) -> Result<(), SyncError> {
    std::fs::create_dir_all(state_dir).map_err(|e| io_err(state_dir, e))?;

    let live = generated_dir_at(state_dir);
    let next = state_dir.join(format!("{GENERATED_DIR}.next"));
    let old = state_dir.join(format!("{GENERATED_DIR}.old"));
    remove_dir_if_exists(&next)?;
    remove_dir_if_exists(&old)?;

    std::fs::create_dir_all(&next).map_err(|e| io_err(&next, e))?;
    for record in records {
        let Some(contents) = &record.contents else {
            continue;
        };
        let target = next.join(&record.path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        std::fs::write(&target, contents).map_err(|e| io_err(&target, e))?;
    }

    if live.exists() {
        std::fs::rename(&live, &old).map_err(|e| io_err(&live, e))?;
    }
    if let Err(e) = std::fs::rename(&next, &live) {
        let _ = std::fs::rename(&old, &live);
        return Err(io_err(&live, e));
    }
    remove_dir_if_exists(&old)?;

    let map = FileIdMapFile {
        version: PAYLOAD_VERSION,
        generated_at: Utc::now(),
        files: records
            .iter()
            .map(|record| {
                (
                    record.id.clone(),
                    PayloadEntry {
                        path: record.path.clone(),
                        hash: record.hash.clone(),
                    },
                )
            })
            .collect(),
    };
    let json = serde_json::to_string_pretty(&map)?;
    let path = file_id_map_path_at(state_dir);
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    tracing::debug!(files = records.len(), state_dir = %state_dir.display(), "saved generated payload");
    Ok(())
}

pub(crate) fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, SyncError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

fn remove_dir_if_exists(path: &Path) -> Result<(), SyncError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(path, err)),
    }
}
