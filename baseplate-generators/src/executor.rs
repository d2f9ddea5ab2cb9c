//! Runs a resolved [`TaskPlan`]: the `run` phase concurrently, the `build`
//! phase sequentially in plan order.
//!
//! Scheduling in the run phase counts unfinished exporters per task. A task
//! is spawned on the blocking pool once its count reaches zero, so a
//! consumer never starts before the tasks whose exports it reads. Output
//! dependencies only constrain the build phase, which already runs in
//! topological order.

use std::collections::BTreeSet;

use baseplate_core::{ProviderKind, ProviderMap, TaskId};
use tokio::task::JoinSet;

use crate::builder::{MetadataOptions, TaskBuilder};
use crate::bundle::GeneratorBundle;
use crate::cancel::CancelSignal;
use crate::entry::{plan, PlannedTask, TaskPlan};
use crate::error::{BoxError, GeneratorError};
use crate::output::{GeneratorOutput, OutputAggregator};
use crate::task::{BuildFn, TaskRun};

#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub metadata_options: MetadataOptions,
    pub cancel: CancelSignal,
}

/// Resolve and execute `root`, returning the aggregated output.
///
/// Nothing touches the filesystem: any failure leaves the caller with an
/// error and no partial output.
pub async fn execute_generator_entry(
    root: GeneratorBundle,
    options: &ExecuteOptions,
) -> Result<GeneratorOutput, GeneratorError> {
    let plan = plan(root)?;
    tracing::debug!(tasks = plan.tasks.len(), "resolved generator plan");
    execute_plan(plan, options).await
}

pub async fn execute_plan(
    plan: TaskPlan,
    options: &ExecuteOptions,
) -> Result<GeneratorOutput, GeneratorError> {
    let builds = run_phase(&plan, &options.cancel).await?;
    build_phase(&plan, builds, options)
}

// ---------------------------------------------------------------------------
// Run phase
// ---------------------------------------------------------------------------

async fn run_phase(
    plan: &TaskPlan,
    cancel: &CancelSignal,
) -> Result<Vec<Option<BuildFn>>, GeneratorError> {
    let len = plan.tasks.len();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); len];
    let mut pending: Vec<usize> = vec![0; len];
    for (index, task) in plan.tasks.iter().enumerate() {
        let sources: BTreeSet<usize> = task
            .dependencies
            .iter()
            .filter(|dep| dep.key.kind == ProviderKind::Export)
            .filter_map(|dep| dep.source)
            .collect();
        pending[index] = sources.len();
        for source in sources {
            dependents[source].push(index);
        }
    }

    let mut exported: Vec<Option<ProviderMap>> = vec![None; len];
    let mut builds: Vec<Option<BuildFn>> = (0..len).map(|_| None).collect();
    let mut running: JoinSet<(usize, Result<TaskRun, BoxError>)> = JoinSet::new();

    for &index in &plan.order {
        if pending[index] == 0 {
            spawn_run(&mut running, plan, index, &exported);
        }
    }

    let mut finished = 0;
    while let Some(joined) = running.join_next().await {
        let (index, result) = joined.map_err(|e| GeneratorError::Join(e.to_string()))?;
        let task = &plan.tasks[index];
        let run = result.map_err(|source| GeneratorError::TaskRun {
            task: task.flat.id().clone(),
            source,
        })?;

        for spec in task.flat.task.exports() {
            if !run.providers.contains(spec.key.name) {
                return Err(GeneratorError::ExportNotProvided {
                    task: task.flat.id().clone(),
                    provider: spec.key.name.to_string(),
                });
            }
        }
        for name in run.providers.names() {
            if !task.flat.task.exports().iter().any(|spec| spec.key.name == name) {
                tracing::warn!(task = %task.flat.id(), provider = name, "ignoring undeclared export");
            }
        }

        finished += 1;
        tracing::debug!(task = %task.flat.id(), "run finished");
        let TaskRun { providers, build } = run;
        exported[index] = Some(providers);
        builds[index] = build;

        if cancel.is_cancelled() {
            return Err(GeneratorError::Cancelled);
        }
        for &dependent in &dependents[index] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                spawn_run(&mut running, plan, dependent, &exported);
            }
        }
    }

    if finished != len {
        // Only reachable if the plan's edges disagree with its order.
        return Err(GeneratorError::Join(format!(
            "{} of {len} tasks never became ready",
            len - finished
        )));
    }
    Ok(builds)
}

fn spawn_run(
    running: &mut JoinSet<(usize, Result<TaskRun, BoxError>)>,
    plan: &TaskPlan,
    index: usize,
    exported: &[Option<ProviderMap>],
) {
    let task = &plan.tasks[index];
    let deps = collect_inputs(task, ProviderKind::Export, exported);
    let context = task.flat.context.clone();
    let run = task.flat.task.run_fn();
    tracing::trace!(task = %context.task_id, "spawning run");
    running.spawn_blocking(move || {
        let result = match run {
            Some(run) => run(&deps, &context),
            None => Ok(TaskRun::new()),
        };
        (index, result)
    });
}

/// Gather the provider values `task` consumes of the given kind from the
/// per-task provider maps produced so far.
fn collect_inputs(task: &PlannedTask, kind: ProviderKind, produced: &[Option<ProviderMap>]) -> ProviderMap {
    let mut inputs = ProviderMap::new();
    for dep in task.dependencies.iter().filter(|dep| dep.key.kind == kind) {
        let value = dep
            .source
            .and_then(|source| produced[source].as_ref())
            .and_then(|map| map.get_erased(dep.key.name));
        if let Some(value) = value {
            inputs.insert_erased(dep.key.name, value);
        }
    }
    inputs
}

// ---------------------------------------------------------------------------
// Build phase
// ---------------------------------------------------------------------------

fn build_phase(
    plan: &TaskPlan,
    mut builds: Vec<Option<BuildFn>>,
    options: &ExecuteOptions,
) -> Result<GeneratorOutput, GeneratorError> {
    let mut produced: Vec<Option<ProviderMap>> = vec![None; plan.tasks.len()];
    let mut aggregator = OutputAggregator::new();

    for &index in &plan.order {
        if options.cancel.is_cancelled() {
            return Err(GeneratorError::Cancelled);
        }
        let task = &plan.tasks[index];
        let id: &TaskId = task.flat.id();
        let outputs = collect_inputs(task, ProviderKind::Output, &produced);
        let mut builder = TaskBuilder::new(id.clone(), options.metadata_options.clone(), outputs);

        let provided = match builds[index].take() {
            Some(build) => build(&mut builder).map_err(|source| GeneratorError::TaskBuild {
                task: id.clone(),
                source,
            })?,
            None => ProviderMap::new(),
        };
        for spec in task.flat.task.outputs() {
            if !provided.contains(spec.key.name) {
                return Err(GeneratorError::OutputNotProvided {
                    task: id.clone(),
                    provider: spec.key.name.to_string(),
                });
            }
        }
        produced[index] = Some(provided);

        let (files, commands) = builder.into_parts();
        tracing::debug!(task = %id, files = files.len(), commands = commands.len(), "build finished");
        for file in files {
            aggregator.add_file(id, file)?;
        }
        for command in commands {
            aggregator.add_command(command);
        }
    }

    let output = aggregator.finish();
    tracing::info!(
        files = output.files.len(),
        commands = output.post_write_commands.len(),
        "generation finished"
    );
    Ok(output)
}
