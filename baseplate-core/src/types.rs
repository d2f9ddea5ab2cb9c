//! Domain types shared by the generator executor and the sync engine.
//!
//! Relative paths of generated files are `String`s with `/` separators; they
//! are joined onto an app root only at the filesystem boundary.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Stable identity of a logical output file, independent of its path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub String);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for FileId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for FileId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of a flattened generator task: `<bundle path>#<task name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Visibility boundary for a provider export.
///
/// `global` is implicitly declared by the root bundle; `package`, `project`
/// and custom scopes are declared by the bundles that own them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExportScope(&'static str);

impl ExportScope {
    pub const GLOBAL: ExportScope = ExportScope("global");
    pub const PACKAGE: ExportScope = ExportScope("package");
    pub const PROJECT: ExportScope = ExportScope("project");
    /// Scope used for exports that do not name one.
    pub(crate) const DEFAULT: ExportScope = ExportScope("<default>");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ExportScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Whether a provider comes out of a task's `run` or its `build` phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Export,
    Output,
}

/// Type-erased half of a [`ProviderToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProviderKey {
    pub name: &'static str,
    pub kind: ProviderKind,
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name.fmt(f)
    }
}

/// A typed capability token. `T` is the value type stored under `name`.
///
/// ```
/// use baseplate_core::ProviderToken;
///
/// struct NodeSetup { package_manager: String }
/// static NODE_SETUP: ProviderToken<NodeSetup> = ProviderToken::new("node-setup");
/// assert_eq!(NODE_SETUP.name(), "node-setup");
/// ```
pub struct ProviderToken<T> {
    key: ProviderKey,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ProviderToken<T> {
    /// Token for a provider exported from a task's `run` phase.
    pub const fn new(name: &'static str) -> Self {
        Self {
            key: ProviderKey {
                name,
                kind: ProviderKind::Export,
            },
            _marker: PhantomData,
        }
    }

    /// Token for a provider produced by a task's `build` phase.
    pub const fn output(name: &'static str) -> Self {
        Self {
            key: ProviderKey {
                name,
                kind: ProviderKind::Output,
            },
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.key.name
    }

    pub fn key(&self) -> ProviderKey {
        self.key
    }
}

impl<T> Clone for ProviderToken<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ProviderToken<T> {}

impl<T> fmt::Debug for ProviderToken<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderToken")
            .field("name", &self.key.name)
            .field("kind", &self.key.kind)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Virtual files
// ---------------------------------------------------------------------------

/// Template provenance recorded on a generated file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateMetadata {
    pub name: String,
    pub generator: String,
}

/// Per-file write behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Only create the file when it does not exist yet; never merge into it.
    #[serde(default)]
    pub never_overwrite: bool,
    /// Always take the generated contents, discarding working-copy edits.
    #[serde(default)]
    pub skip_merge: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateMetadata>,
}

/// One emitted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFile {
    pub id: FileId,
    pub relative_path: String,
    pub contents: Vec<u8>,
    pub options: WriteOptions,
}

impl VirtualFile {
    pub fn new(
        id: impl Into<FileId>,
        relative_path: impl Into<String>,
        contents: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            id: id.into(),
            relative_path: relative_path.into(),
            contents: contents.into(),
            options: WriteOptions::default(),
        }
    }

    pub fn with_options(mut self, options: WriteOptions) -> Self {
        self.options = options;
        self
    }
}

// ---------------------------------------------------------------------------
// Post-write commands
// ---------------------------------------------------------------------------

/// Ordering bucket for post-write commands; lower runs first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandPriority {
    /// Dependency installation (`pnpm install` and friends).
    Dependencies,
    /// Code generators that read installed dependencies.
    Codegen,
    #[default]
    Default,
}

/// A shell command registered by a generator to run after files are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostWriteCommand {
    pub command: String,
    /// Relative to the app root; the app root itself when `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    /// Run only when one of these relative paths was written this pass.
    /// Empty means run unconditionally.
    #[serde(default)]
    pub only_if_changed: Vec<String>,
    #[serde(default)]
    pub priority: CommandPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl PostWriteCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            working_directory: None,
            only_if_changed: Vec::new(),
            priority: CommandPriority::Default,
            timeout_secs: None,
        }
    }

    pub fn in_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn only_if_changed<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only_if_changed = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn priority(mut self, priority: CommandPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;
    static MARKER: ProviderToken<Marker> = ProviderToken::new("marker");
    static MARKER_OUT: ProviderToken<Marker> = ProviderToken::output("marker-out");

    #[test]
    fn newtype_display() {
        assert_eq!(FileId::from("app:main").to_string(), "app:main");
        assert_eq!(TaskId::from("root#setup").to_string(), "root#setup");
    }

    #[test]
    fn token_kind_follows_constructor() {
        assert_eq!(MARKER.key().kind, ProviderKind::Export);
        assert_eq!(MARKER_OUT.key().kind, ProviderKind::Output);
        assert_eq!(MARKER_OUT.name(), "marker-out");
    }

    #[test]
    fn command_priority_orders_dependencies_first() {
        let mut priorities = vec![
            CommandPriority::Default,
            CommandPriority::Codegen,
            CommandPriority::Dependencies,
        ];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![
                CommandPriority::Dependencies,
                CommandPriority::Codegen,
                CommandPriority::Default
            ]
        );
    }

    #[test]
    fn post_write_command_serde_roundtrip() {
        let cmd = PostWriteCommand::new("pnpm install")
            .only_if_changed(["package.json"])
            .priority(CommandPriority::Dependencies);
        let json = serde_yaml::to_string(&cmd).expect("serialize");
        let back: PostWriteCommand = serde_yaml::from_str(&json).expect("deserialize");
        assert_eq!(back, cmd);
    }
}
