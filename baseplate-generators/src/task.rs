//! Generator tasks: declared dependencies, exports and outputs plus the `run`
//! closure that turns resolved dependencies into providers.

use std::fmt;
use std::sync::Arc;

use baseplate_core::{ExportScope, ProviderKey, ProviderMap, ProviderToken, TaskId};

use crate::builder::TaskBuilder;
use crate::error::BoxError;

pub type TaskResult<T> = Result<T, BoxError>;

/// Closure run in the build phase. Returns the task's output providers.
pub type BuildFn = Box<dyn FnOnce(&mut TaskBuilder) -> TaskResult<ProviderMap> + Send>;

pub(crate) type RunFn = dyn Fn(&ProviderMap, &TaskContext) -> TaskResult<TaskRun> + Send + Sync;

/// Where a task sits in the bundle tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    pub task_id: TaskId,
    /// Accumulated bundle directory relative to the app root, `/`-separated.
    /// Empty for tasks of bundles without a directory.
    pub directory: String,
}

impl TaskContext {
    /// Join `path` onto the task's directory.
    pub fn path(&self, path: &str) -> String {
        if self.directory.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.directory, path)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencySpec {
    pub key: ProviderKey,
    pub optional: bool,
}

/// An export or output declaration. `scope: None` means the parent bundle's
/// default scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSpec {
    pub key: ProviderKey,
    pub scope: Option<ExportScope>,
}

/// What `run` hands back: exported providers and an optional build step.
#[derive(Default)]
pub struct TaskRun {
    pub(crate) providers: ProviderMap,
    pub(crate) build: Option<BuildFn>,
}

impl TaskRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provide<T: Send + Sync + 'static>(mut self, token: &ProviderToken<T>, value: T) -> Self {
        self.providers.insert(token, value);
        self
    }

    pub fn build<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut TaskBuilder) -> TaskResult<ProviderMap> + Send + 'static,
    {
        self.build = Some(Box::new(build));
        self
    }

    pub fn providers(&self) -> &ProviderMap {
        &self.providers
    }
}

impl fmt::Debug for TaskRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRun")
            .field("providers", &self.providers)
            .field("build", &self.build.is_some())
            .finish()
    }
}

/// A unit of work in the generator graph.
///
/// ```
/// use baseplate_core::{ProviderMap, ProviderToken, VirtualFile};
/// use baseplate_generators::{GeneratorTask, TaskRun};
///
/// static NAME: ProviderToken<String> = ProviderToken::new("package-name");
///
/// let task = GeneratorTask::new("readme")
///     .dependency(&NAME)
///     .run(|deps, ctx| {
///         let name = deps.require(&NAME)?.clone();
///         let path = ctx.path("README.md");
///         Ok(TaskRun::new().build(move |builder| {
///             builder.write_file(VirtualFile::new("readme", path, format!("# {name}\n")));
///             Ok(ProviderMap::new())
///         }))
///     });
/// assert_eq!(task.name(), "readme");
/// ```
#[derive(Clone)]
pub struct GeneratorTask {
    name: String,
    dependencies: Vec<DependencySpec>,
    exports: Vec<ExportSpec>,
    outputs: Vec<ExportSpec>,
    run: Option<Arc<RunFn>>,
}

impl GeneratorTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            exports: Vec::new(),
            outputs: Vec::new(),
            run: None,
        }
    }

    pub fn dependency<T>(mut self, token: &ProviderToken<T>) -> Self {
        self.dependencies.push(DependencySpec {
            key: token.key(),
            optional: false,
        });
        self
    }

    /// A dependency that resolves to "absent" when nobody exports it.
    pub fn optional_dependency<T>(mut self, token: &ProviderToken<T>) -> Self {
        self.dependencies.push(DependencySpec {
            key: token.key(),
            optional: true,
        });
        self
    }

    /// Export into the parent bundle's default scope.
    pub fn export<T>(mut self, token: &ProviderToken<T>) -> Self {
        self.exports.push(ExportSpec {
            key: token.key(),
            scope: None,
        });
        self
    }

    /// Export into the nearest ancestor declaring `scope`.
    pub fn export_to<T>(mut self, token: &ProviderToken<T>, scope: ExportScope) -> Self {
        self.exports.push(ExportSpec {
            key: token.key(),
            scope: Some(scope),
        });
        self
    }

    pub fn output<T>(mut self, token: &ProviderToken<T>) -> Self {
        self.outputs.push(ExportSpec {
            key: token.key(),
            scope: None,
        });
        self
    }

    pub fn output_to<T>(mut self, token: &ProviderToken<T>, scope: ExportScope) -> Self {
        self.outputs.push(ExportSpec {
            key: token.key(),
            scope: Some(scope),
        });
        self
    }

    pub fn run<F>(mut self, run: F) -> Self
    where
        F: Fn(&ProviderMap, &TaskContext) -> TaskResult<TaskRun> + Send + Sync + 'static,
    {
        self.run = Some(Arc::new(run));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[DependencySpec] {
        &self.dependencies
    }

    pub fn exports(&self) -> &[ExportSpec] {
        &self.exports
    }

    pub fn outputs(&self) -> &[ExportSpec] {
        &self.outputs
    }

    pub(crate) fn run_fn(&self) -> Option<Arc<RunFn>> {
        self.run.clone()
    }
}

impl fmt::Debug for GeneratorTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorTask")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("exports", &self.exports)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}
