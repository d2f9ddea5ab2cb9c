//! Combining per-task contributions into one output set.

use std::collections::{BTreeMap, HashMap};

use baseplate_core::{FileId, PostWriteCommand, TaskId, VirtualFile};

use crate::error::AggregateError;

/// Everything one generation pass emits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratorOutput {
    /// Keyed by normalised relative path.
    pub files: BTreeMap<String, VirtualFile>,
    /// Sorted by priority, emission order within a priority.
    pub post_write_commands: Vec<PostWriteCommand>,
}

impl GeneratorOutput {
    pub fn get(&self, path: &str) -> Option<&VirtualFile> {
        self.files.get(path)
    }

    pub fn file_id_map(&self) -> BTreeMap<FileId, String> {
        self.files
            .values()
            .map(|file| (file.id.clone(), file.relative_path.clone()))
            .collect()
    }
}

/// Accumulates files and commands from successive build steps.
#[derive(Debug, Default)]
pub struct OutputAggregator {
    files: BTreeMap<String, (VirtualFile, TaskId)>,
    paths_by_id: HashMap<FileId, String>,
    commands: Vec<PostWriteCommand>,
}

impl OutputAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, owner: &TaskId, mut file: VirtualFile) -> Result<(), AggregateError> {
        let path = normalize_relative_path(&file.relative_path)?;
        file.relative_path = path.clone();

        if let Some(existing_path) = self.paths_by_id.get(&file.id) {
            if *existing_path != path {
                return Err(AggregateError::AmbiguousFileId {
                    id: file.id,
                    first_path: existing_path.clone(),
                    second_path: path,
                });
            }
        }

        if let Some((existing, first_task)) = self.files.get(&path) {
            if existing.id != file.id {
                return Err(AggregateError::AmbiguousPath {
                    path,
                    first_id: existing.id.clone(),
                    first_task: first_task.clone(),
                    second_id: file.id,
                    second_task: owner.clone(),
                });
            }
            if existing.contents != file.contents || existing.options != file.options {
                return Err(AggregateError::ConflictingWrite {
                    path,
                    id: file.id,
                    first_task: first_task.clone(),
                    second_task: owner.clone(),
                });
            }
            tracing::trace!(path = %path, task = %owner, "dropping identical contribution");
            return Ok(());
        }

        self.paths_by_id.insert(file.id.clone(), path.clone());
        self.files.insert(path, (file, owner.clone()));
        Ok(())
    }

    pub fn add_command(&mut self, command: PostWriteCommand) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn finish(self) -> GeneratorOutput {
        let mut post_write_commands = self.commands;
        // Stable: emission order survives within a priority.
        post_write_commands.sort_by_key(|command| command.priority);
        GeneratorOutput {
            files: self
                .files
                .into_iter()
                .map(|(path, (file, _))| (path, file))
                .collect(),
            post_write_commands,
        }
    }
}

/// `\` becomes `/`, `.` segments and duplicate separators are dropped.
/// Absolute paths and paths that climb out with `..` are rejected.
pub fn normalize_relative_path(path: &str) -> Result<String, AggregateError> {
    let invalid = |reason| AggregateError::InvalidPath {
        path: path.to_string(),
        reason,
    };

    let unified = path.replace('\\', "/");
    if unified.starts_with('/') || has_drive_prefix(&unified) {
        return Err(invalid("absolute paths are not allowed"));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(invalid("path escapes the output root")),
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return Err(invalid("path is empty"));
    }
    Ok(segments.join("/"))
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;
    use baseplate_core::CommandPriority;

    fn task(name: &str) -> TaskId {
        TaskId::from(name)
    }

    #[test]
    fn normalizes_separators_and_dot_segments() {
        assert_eq!(normalize_relative_path("./src\\lib.rs").unwrap(), "src/lib.rs");
        assert_eq!(normalize_relative_path("a//b/./c").unwrap(), "a/b/c");
    }

    #[test]
    fn rejects_absolute_and_escaping_paths() {
        for bad in ["/etc/passwd", "C:/x", "../x", "a/../../b", ""] {
            assert!(
                matches!(normalize_relative_path(bad), Err(AggregateError::InvalidPath { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn same_path_different_ids_is_ambiguous() {
        let mut agg = OutputAggregator::new();
        agg.add_file(&task("a"), VirtualFile::new("one", "x.txt", "1")).unwrap();
        let err = agg
            .add_file(&task("b"), VirtualFile::new("two", "./x.txt", "1"))
            .unwrap_err();
        assert!(matches!(err, AggregateError::AmbiguousPath { .. }), "{err}");
    }

    #[test]
    fn same_id_different_paths_is_ambiguous() {
        let mut agg = OutputAggregator::new();
        agg.add_file(&task("a"), VirtualFile::new("one", "x.txt", "1")).unwrap();
        let err = agg
            .add_file(&task("a"), VirtualFile::new("one", "y.txt", "1"))
            .unwrap_err();
        assert_eq!(
            err,
            AggregateError::AmbiguousFileId {
                id: FileId::from("one"),
                first_path: "x.txt".into(),
                second_path: "y.txt".into(),
            }
        );
    }

    #[test]
    fn identical_contribution_is_deduplicated() {
        let mut agg = OutputAggregator::new();
        agg.add_file(&task("a"), VirtualFile::new("one", "x.txt", "1")).unwrap();
        agg.add_file(&task("b"), VirtualFile::new("one", "x.txt", "1")).unwrap();
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn differing_contents_for_same_file_conflict() {
        let mut agg = OutputAggregator::new();
        agg.add_file(&task("a"), VirtualFile::new("one", "x.txt", "1")).unwrap();
        let err = agg
            .add_file(&task("b"), VirtualFile::new("one", "x.txt", "2"))
            .unwrap_err();
        assert!(matches!(err, AggregateError::ConflictingWrite { .. }));
    }

    #[test]
    fn commands_sort_by_priority_stably() {
        let mut agg = OutputAggregator::new();
        agg.add_command(PostWriteCommand::new("fmt"));
        agg.add_command(PostWriteCommand::new("codegen").priority(CommandPriority::Codegen));
        agg.add_command(PostWriteCommand::new("install").priority(CommandPriority::Dependencies));
        agg.add_command(PostWriteCommand::new("lint"));
        let output = agg.finish();
        let order: Vec<_> = output
            .post_write_commands
            .iter()
            .map(|c| c.command.as_str())
            .collect();
        assert_eq!(order, vec!["install", "codegen", "fmt", "lint"]);
    }
}
