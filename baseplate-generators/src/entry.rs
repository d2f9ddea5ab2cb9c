//! Flattening a bundle tree into a task arena and resolving every dependency
//! to the task that exports it.
//!
//! Bundle ids are slash-joined paths from the root (`root/apps/web`); task ids
//! append the task name (`root/apps/web#package-json`). Each flattened task
//! carries its scope chain, nearest first:
//!
//! 1. the default scope of its own bundle (filled by the bundle's children)
//! 2. the scopes its own bundle declares
//! 3. the parent's chain, ending with the root's `global` scope

use std::collections::HashSet;

use baseplate_core::{
    graph::toposort_indices, ExportScope, Exporter, GraphError, ProviderKey, ProviderKind,
    ProviderRegistry, ScopeInstance, TaskId,
};

use crate::bundle::GeneratorBundle;
use crate::error::GeneratorError;
use crate::task::{ExportSpec, GeneratorTask, TaskContext};

/// One task of the flattened tree.
#[derive(Debug, Clone)]
pub struct FlatTask {
    pub context: TaskContext,
    pub bundle_id: String,
    pub scope_chain: Vec<ScopeInstance>,
    /// Receives exports that name no scope: the parent bundle's default scope.
    pub default_target: ScopeInstance,
    pub task: GeneratorTask,
}

impl FlatTask {
    pub fn id(&self) -> &TaskId {
        &self.context.task_id
    }

    /// Scope instance an export with `scope` lands on, if any is visible.
    pub fn export_target(&self, scope: Option<ExportScope>) -> Option<ScopeInstance> {
        match scope {
            None => Some(self.default_target.clone()),
            Some(ExportScope::GLOBAL) => self
                .scope_chain
                .iter()
                .rev()
                .find(|instance| instance.scope == ExportScope::GLOBAL)
                .cloned(),
            Some(scope) => self
                .scope_chain
                .iter()
                .find(|instance| !instance.is_default() && instance.scope == scope)
                .cloned(),
        }
    }
}

/// A dependency pointing at the arena index of its exporter; `None` for an
/// optional dependency nobody exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub key: ProviderKey,
    pub source: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct PlannedTask {
    pub flat: FlatTask,
    pub dependencies: Vec<ResolvedDependency>,
}

/// The resolved task arena plus its execution order.
#[derive(Debug, Clone)]
pub struct TaskPlan {
    /// Tasks in pre-order (a bundle's tasks before its children).
    pub tasks: Vec<PlannedTask>,
    /// Arena indices, every exporter before its consumers.
    pub order: Vec<usize>,
}

impl TaskPlan {
    pub fn ordered_ids(&self) -> Vec<&TaskId> {
        self.order.iter().map(|&i| self.tasks[i].flat.id()).collect()
    }
}

struct Frame {
    id: String,
    directory: String,
    chain: Vec<ScopeInstance>,
}

/// Pre-order flattening of `root`.
pub fn flatten(root: GeneratorBundle) -> Result<Vec<FlatTask>, GeneratorError> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    walk(root, None, &mut out, &mut seen)?;
    Ok(out)
}

fn walk(
    bundle: GeneratorBundle,
    parent: Option<&Frame>,
    out: &mut Vec<FlatTask>,
    seen: &mut HashSet<TaskId>,
) -> Result<(), GeneratorError> {
    let id = match parent {
        Some(p) => format!("{}/{}", p.id, bundle.name),
        None => bundle.name.clone(),
    };
    let directory = join_directory(
        parent.map(|p| p.directory.as_str()).unwrap_or(""),
        bundle.directory.as_deref(),
    );

    let mut chain = vec![ScopeInstance::default_for(id.as_str())];
    for scope in &bundle.scopes {
        let instance = ScopeInstance::new(id.as_str(), *scope);
        if !chain.contains(&instance) {
            chain.push(instance);
        }
    }
    match parent {
        Some(p) => chain.extend(p.chain.iter().cloned()),
        None if !bundle.scopes.contains(&ExportScope::GLOBAL) => {
            chain.push(ScopeInstance::new(id.as_str(), ExportScope::GLOBAL));
        }
        None => {}
    }

    let default_target = match parent {
        Some(p) => ScopeInstance::default_for(p.id.as_str()),
        None => ScopeInstance::default_for(id.as_str()),
    };

    for task in bundle.tasks {
        let task_id = TaskId(format!("{id}#{}", task.name()));
        if !seen.insert(task_id.clone()) {
            return Err(GeneratorError::DuplicateTask { id: task_id });
        }
        out.push(FlatTask {
            context: TaskContext {
                task_id,
                directory: directory.clone(),
            },
            bundle_id: id.clone(),
            scope_chain: chain.clone(),
            default_target: default_target.clone(),
            task,
        });
    }

    let frame = Frame {
        id,
        directory,
        chain,
    };
    let mut names = HashSet::new();
    for child in bundle.children {
        if !names.insert(child.name.clone()) {
            return Err(GeneratorError::DuplicateBundle {
                parent: frame.id.clone(),
                name: child.name,
            });
        }
        walk(child, Some(&frame), out, seen)?;
    }
    Ok(())
}

fn join_directory(parent: &str, own: Option<&str>) -> String {
    let own = own.map(|d| d.trim_matches('/')).unwrap_or("");
    match (parent.is_empty(), own.is_empty()) {
        (_, true) => parent.to_string(),
        (true, false) => own.to_string(),
        (false, false) => format!("{parent}/{own}"),
    }
}

/// Flatten `root`, register every export, resolve every dependency and
/// order the result. Fails before any task runs.
pub fn plan(root: GeneratorBundle) -> Result<TaskPlan, GeneratorError> {
    let flat = flatten(root)?;

    let mut exports = ProviderRegistry::new();
    let mut outputs = ProviderRegistry::new();
    for (index, task) in flat.iter().enumerate() {
        register_all(&mut exports, index, task, task.task.exports())?;
        register_all(&mut outputs, index, task, task.task.outputs())?;
    }

    let mut edges = Vec::new();
    let mut resolved = Vec::with_capacity(flat.len());
    for (index, task) in flat.iter().enumerate() {
        let mut dependencies = Vec::with_capacity(task.task.dependencies().len());
        for dep in task.task.dependencies() {
            let registry = match dep.key.kind {
                ProviderKind::Export => &exports,
                ProviderKind::Output => &outputs,
            };
            let source = match registry.resolve(&task.scope_chain, dep.key.name) {
                Some(exporter) => {
                    edges.push((exporter.task, index));
                    Some(exporter.task)
                }
                None if dep.optional => {
                    tracing::debug!(task = %task.id(), provider = dep.key.name, "optional dependency is absent");
                    None
                }
                None => {
                    return Err(GeneratorError::MissingProvider {
                        task: task.id().clone(),
                        provider: dep.key.name.to_string(),
                    })
                }
            };
            dependencies.push(ResolvedDependency {
                key: dep.key,
                source,
            });
        }
        resolved.push(dependencies);
    }

    let order = toposort_indices(flat.len(), &edges).map_err(|cycle| GraphError::Cycle {
        path: cycle.iter().map(|&i| flat[i].id().to_string()).collect(),
    })?;

    let tasks = flat
        .into_iter()
        .zip(resolved)
        .map(|(flat, dependencies)| PlannedTask { flat, dependencies })
        .collect();
    Ok(TaskPlan { tasks, order })
}

fn register_all(
    registry: &mut ProviderRegistry,
    index: usize,
    task: &FlatTask,
    specs: &[ExportSpec],
) -> Result<(), GeneratorError> {
    for spec in specs {
        let instance = task
            .export_target(spec.scope)
            .ok_or_else(|| GeneratorError::ScopeNotFound {
                task: task.id().clone(),
                provider: spec.key.name.to_string(),
                scope: spec.scope.map(|s| s.to_string()).unwrap_or_default(),
            })?;
        registry.register(
            instance,
            spec.key.name,
            Exporter {
                task: index,
                label: task.id().to_string(),
            },
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use baseplate_core::{ProviderError, ProviderToken};

    static CONFIG: ProviderToken<String> = ProviderToken::new("config");
    static OTHER: ProviderToken<String> = ProviderToken::new("other");

    fn ids(plan: &TaskPlan) -> Vec<String> {
        plan.ordered_ids().iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn flatten_is_pre_order_with_joined_directories() {
        let root = GeneratorBundle::new("root")
            .task(GeneratorTask::new("a"))
            .child(
                GeneratorBundle::new("web")
                    .directory("apps/web")
                    .task(GeneratorTask::new("b"))
                    .child(GeneratorBundle::new("src").directory("src").task(GeneratorTask::new("c"))),
            )
            .task(GeneratorTask::new("d"));
        let flat = flatten(root).unwrap();
        let ids: Vec<_> = flat.iter().map(|t| t.id().to_string()).collect();
        assert_eq!(ids, vec!["root#a", "root#d", "root/web#b", "root/web/src#c"]);
        assert_eq!(flat[3].context.directory, "apps/web/src");
        assert_eq!(flat[0].context.directory, "");
    }

    #[test]
    fn duplicate_sibling_bundles_are_rejected() {
        let root = GeneratorBundle::new("root")
            .child(GeneratorBundle::new("x"))
            .child(GeneratorBundle::new("x"));
        assert!(matches!(
            flatten(root),
            Err(GeneratorError::DuplicateBundle { .. })
        ));
    }

    #[test]
    fn consumer_is_ordered_after_exporter_declared_later() {
        let root = GeneratorBundle::new("root")
            .task(GeneratorTask::new("consumer").dependency(&CONFIG))
            .child(GeneratorBundle::new("setup").task(GeneratorTask::new("exporter").export(&CONFIG)));
        let plan = plan(root).unwrap();
        assert_eq!(ids(&plan), vec!["root/setup#exporter", "root#consumer"]);
        assert_eq!(plan.tasks[0].dependencies[0].source, Some(1));
    }

    #[test]
    fn package_scope_isolates_sibling_packages() {
        let package = |name: &str| {
            GeneratorBundle::new(name)
                .scope(ExportScope::PACKAGE)
                .child(GeneratorBundle::new("config").task(GeneratorTask::new("export").export_to(&CONFIG, ExportScope::PACKAGE)))
                .child(GeneratorBundle::new("use").task(GeneratorTask::new("consume").dependency(&CONFIG)))
        };
        let root = GeneratorBundle::new("root").child(package("a")).child(package("b"));
        let plan = plan(root).unwrap();

        let source_label = |consumer: &str| {
            let task = plan
                .tasks
                .iter()
                .find(|t| t.flat.id().0 == consumer)
                .expect("consumer");
            let source = task.dependencies[0].source.expect("resolved");
            plan.tasks[source].flat.id().to_string()
        };
        assert_eq!(source_label("root/a/use#consume"), "root/a/config#export");
        assert_eq!(source_label("root/b/use#consume"), "root/b/config#export");
    }

    #[test]
    fn global_exports_are_visible_everywhere() {
        let root = GeneratorBundle::new("root")
            .child(GeneratorBundle::new("deep").child(
                GeneratorBundle::new("deeper").task(GeneratorTask::new("g").export_to(&CONFIG, ExportScope::GLOBAL)),
            ))
            .child(GeneratorBundle::new("other").task(GeneratorTask::new("use").dependency(&CONFIG)));
        assert_eq!(ids(&plan(root).unwrap()), vec!["root/deep/deeper#g", "root/other#use"]);
    }

    #[test]
    fn undeclared_scope_is_rejected() {
        let root = GeneratorBundle::new("root")
            .task(GeneratorTask::new("t").export_to(&CONFIG, ExportScope::PROJECT));
        assert!(matches!(plan(root), Err(GeneratorError::ScopeNotFound { .. })));
    }

    #[test]
    fn duplicate_exporter_is_rejected() {
        let root = GeneratorBundle::new("root")
            .child(GeneratorBundle::new("a").task(GeneratorTask::new("one").export(&CONFIG)))
            .child(GeneratorBundle::new("b").task(GeneratorTask::new("two").export(&CONFIG)));
        match plan(root) {
            Err(GeneratorError::Provider(ProviderError::DuplicateExport { first, second, .. })) => {
                assert_eq!(first, "root/a#one");
                assert_eq!(second, "root/b#two");
            }
            other => panic!("expected duplicate export, got {other:?}"),
        }
    }

    #[test]
    fn missing_required_provider_fails_before_running() {
        let root = GeneratorBundle::new("root").task(GeneratorTask::new("t").dependency(&OTHER));
        match plan(root) {
            Err(GeneratorError::MissingProvider { task, provider }) => {
                assert_eq!(task.0, "root#t");
                assert_eq!(provider, "other");
            }
            other => panic!("expected missing provider, got {other:?}"),
        }
    }

    #[test]
    fn optional_dependency_resolves_to_absent() {
        let root = GeneratorBundle::new("root").task(GeneratorTask::new("t").optional_dependency(&OTHER));
        let plan = plan(root).unwrap();
        assert_eq!(plan.tasks[0].dependencies[0].source, None);
    }

    #[test]
    fn mutual_dependency_reports_cycle_path() {
        let root = GeneratorBundle::new("root")
            .child(GeneratorBundle::new("a").task(GeneratorTask::new("x").export(&CONFIG).dependency(&OTHER)))
            .child(GeneratorBundle::new("b").task(GeneratorTask::new("y").export(&OTHER).dependency(&CONFIG)));
        match plan(root) {
            Err(GeneratorError::Graph(GraphError::Cycle { path })) => {
                assert!(path.contains(&"root/a#x".to_string()));
                assert!(path.contains(&"root/b#y".to_string()));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }
}
