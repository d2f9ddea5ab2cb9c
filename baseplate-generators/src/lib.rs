//! # baseplate-generators
//!
//! Generator bundles and the executor that turns them into one in-memory
//! output set.
//!
//! A bundle tree is flattened into a task arena ([`entry`]), every dependency
//! is resolved against the scoped export tables and the tasks are ordered.
//! The [`executor`] then runs every task's `run` closure (concurrently where
//! the graph allows) and every `build` closure in order, funnelling written
//! files through the [`output`] aggregator.
//!
//! ```rust,no_run
//! use baseplate_core::{ProviderMap, ProviderToken};
//! use baseplate_generators::{
//!     execute_generator_entry, Action, ExecuteOptions, GeneratorBundle, GeneratorTask, TaskRun,
//! };
//!
//! static PACKAGE_NAME: ProviderToken<String> = ProviderToken::new("package-name");
//!
//! # async fn demo() -> Result<(), baseplate_generators::GeneratorError> {
//! let root = GeneratorBundle::new("root")
//!     .child(GeneratorBundle::new("meta").task(
//!         GeneratorTask::new("name")
//!             .export(&PACKAGE_NAME)
//!             .run(|_, _| Ok(TaskRun::new().provide(&PACKAGE_NAME, "web".to_string()))),
//!     ))
//!     .task(GeneratorTask::new("readme").dependency(&PACKAGE_NAME).run(|deps, _| {
//!         let name = deps.require(&PACKAGE_NAME)?.clone();
//!         Ok(TaskRun::new().build(move |builder| {
//!             builder.apply([Action::write_file("readme", "README.md", format!("# {name}\n"))])?;
//!             Ok(ProviderMap::new())
//!         }))
//!     }));
//!
//! let output = execute_generator_entry(root, &ExecuteOptions::default()).await?;
//! assert!(output.get("README.md").is_some());
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod bundle;
pub mod cancel;
pub mod entry;
pub mod error;
pub mod executor;
pub mod output;
pub mod task;
pub mod template;

pub use builder::{Action, MetadataOptions, TaskBuilder};
pub use bundle::GeneratorBundle;
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use entry::{flatten, plan, FlatTask, PlannedTask, ResolvedDependency, TaskPlan};
pub use error::{AggregateError, BoxError, GeneratorError};
pub use executor::{execute_generator_entry, execute_plan, ExecuteOptions};
pub use output::{normalize_relative_path, GeneratorOutput, OutputAggregator};
pub use task::{BuildFn, DependencySpec, ExportSpec, GeneratorTask, TaskContext, TaskResult, TaskRun};
pub use template::{render_template, TemplateFile};
