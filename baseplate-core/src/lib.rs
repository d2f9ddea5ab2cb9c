//! Baseplate core library: domain types, provider registry, task graph
//! ordering, project configuration and errors.
//!
//! - [`types`]: newtypes, provider tokens, virtual files
//! - [`provider`]: scoped export table and type-erased provider values
//! - [`graph`]: stable topological sort with cycle reporting
//! - [`config`]: `baseplate.yaml` load / save
//! - [`error`]: [`ConfigError`], [`GraphError`], [`ProviderError`]

pub mod config;
pub mod error;
pub mod graph;
pub mod provider;
pub mod types;

pub use config::{AppConfig, BaseplateConfig, SyncSettings, WorkerSettings};
pub use error::{ConfigError, GraphError, ProviderError};
pub use graph::toposort;
pub use provider::{Exporter, ProviderMap, ProviderRegistry, ScopeInstance};
pub use types::{
    CommandPriority, ExportScope, FileId, PostWriteCommand, ProviderKey, ProviderKind,
    ProviderToken, TaskId, TemplateMetadata, VirtualFile, WriteOptions,
};
