//! Planning: one [`FileOperationResult`] per generated file, decided from
//! the previous baseline, the new generated contents and the working copy.
//!
//! Nothing here writes. The writer consumes the plan once.

use std::collections::HashSet;
use std::path::Path;

use baseplate_core::FileId;
use baseplate_generators::GeneratorOutput;

use crate::error::SyncError;
use crate::merge::MergeStrategies;
use crate::payload::{read_optional, sha256_hex, GeneratedPayload, PayloadEntry};

/// Planned disk mutation for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOperationResult {
    pub id: FileId,
    pub relative_path: String,
    /// Set when the file moves; the writer renames before any content write.
    pub previous_relative_path: Option<String>,
    /// Contents to write at `relative_path`; `None` leaves the file as is.
    pub merged_contents: Option<Vec<u8>>,
    pub generated_contents: Vec<u8>,
    /// Side file receiving the generated bytes when they could not be merged.
    pub conflict_relative_path: Option<String>,
    pub has_conflict: bool,
}

impl FileOperationResult {
    pub fn writes_contents(&self) -> bool {
        self.merged_contents.is_some()
    }

    pub fn is_rename(&self) -> bool {
        self.previous_relative_path.is_some()
    }

    /// Whether this operation changes anything on disk.
    pub fn is_noop(&self) -> bool {
        !self.writes_contents() && !self.is_rename() && self.conflict_relative_path.is_none()
    }
}

enum Decision {
    Keep,
    Write(Vec<u8>),
    Merged { contents: Vec<u8>, conflict: bool },
    SideFile,
}

/// Plan every file of `output` against the working tree at `app_dir`.
pub fn prepare_operations(
    app_dir: &Path,
    output: &GeneratorOutput,
    payload: Option<&GeneratedPayload>,
    strategies: &MergeStrategies,
) -> Result<Vec<FileOperationResult>, SyncError> {
    let current_ids: HashSet<&FileId> = output.files.values().map(|file| &file.id).collect();
    let mut operations = Vec::with_capacity(output.files.len());

    for file in output.files.values() {
        let path = file.relative_path.as_str();
        let previous = payload.and_then(|p| p.entry(&file.id).map(|entry| (p, entry)));

        let previous_relative_path = previous
            .map(|(_, entry)| entry.path.as_str())
            .filter(|old| *old != path && app_dir.join(old).is_file())
            .map(str::to_string);

        // A path vacated by a file that moved elsewhere starts out empty.
        let displaced = payload
            .and_then(|p| p.owner_of(path).map(|owner| (p, owner)))
            .filter(|(_, owner)| **owner != file.id);
        let vacated = displaced.is_some_and(|(_, owner)| current_ids.contains(owner));

        let working = if vacated && previous_relative_path.is_none() {
            None
        } else {
            let working_path = previous_relative_path.as_deref().unwrap_or(path);
            read_optional(&app_dir.join(working_path))?
        };

        let baseline = match (previous, displaced) {
            (Some((payload, entry)), _) => baseline_for(payload, entry, working.as_deref())?,
            (None, Some((payload, owner))) if !vacated => match payload.entry(owner) {
                Some(entry) => baseline_for(payload, entry, working.as_deref())?,
                None => None,
            },
            _ => None,
        };

        let decision = decide(
            path,
            &file.contents,
            working.as_deref(),
            baseline.as_deref(),
            previous.map(|(_, entry)| entry),
            file.options.never_overwrite,
            file.options.skip_merge,
            strategies,
        );

        let mut operation = FileOperationResult {
            id: file.id.clone(),
            relative_path: path.to_string(),
            previous_relative_path,
            merged_contents: None,
            generated_contents: file.contents.clone(),
            conflict_relative_path: None,
            has_conflict: false,
        };
        match decision {
            Decision::Keep => {}
            Decision::Write(contents) => operation.merged_contents = Some(contents),
            Decision::Merged { contents, conflict } => {
                operation.has_conflict = conflict;
                if working.as_deref() != Some(contents.as_slice()) {
                    operation.merged_contents = Some(contents);
                }
            }
            Decision::SideFile => {
                operation.has_conflict = true;
                operation.conflict_relative_path = Some(format!("{path}.conflict"));
            }
        }
        if operation.has_conflict {
            tracing::warn!(path = %path, "merge conflict");
        }
        operations.push(operation);
    }
    Ok(operations)
}

/// Previously generated bytes, falling back to the working copy when the
/// baseline copy is gone but the recorded hash proves they match.
fn baseline_for(
    payload: &GeneratedPayload,
    entry: &PayloadEntry,
    working: Option<&[u8]>,
) -> Result<Option<Vec<u8>>, SyncError> {
    if let Some(bytes) = payload.read_generated(&entry.path)? {
        return Ok(Some(bytes));
    }
    Ok(match (&entry.hash, working) {
        (Some(hash), Some(working)) if sha256_hex(working) == *hash => Some(working.to_vec()),
        _ => None,
    })
}

#[allow(clippy::too_many_arguments)]
fn decide(
    path: &str,
    generated: &[u8],
    working: Option<&[u8]>,
    baseline: Option<&[u8]>,
    previous: Option<&PayloadEntry>,
    never_overwrite: bool,
    skip_merge: bool,
    strategies: &MergeStrategies,
) -> Decision {
    let Some(working) = working else {
        // Deleted by the user: only bring it back when the generator has
        // something new to say.
        let unchanged = match (previous, baseline) {
            (Some(_), Some(baseline)) => baseline == generated,
            (Some(entry), None) => entry.hash.as_deref() == Some(sha256_hex(generated).as_str()),
            (None, _) => false,
        };
        if unchanged {
            tracing::debug!(path, "file was deleted and its generated contents did not change");
            return Decision::Keep;
        }
        return Decision::Write(generated.to_vec());
    };

    if working == generated || never_overwrite {
        return Decision::Keep;
    }
    if skip_merge {
        return Decision::Write(generated.to_vec());
    }

    // No usable baseline: both sides added the file.
    let base = baseline.unwrap_or(&[]);
    match strategies.merge_bytes(Some(base), generated, working, path) {
        Some(result) => Decision::Merged {
            contents: result.merged_text.into_bytes(),
            conflict: result.has_conflict,
        },
        None if base == generated => Decision::Keep,
        None if base == working => Decision::Write(generated.to_vec()),
        None => Decision::SideFile,
    }
}
