//! Error types for baseplate-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from loading or saving the project configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, annotated with the offending path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the file path and serde_yaml line context.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The requested app is not declared in `baseplate.yaml`.
    #[error("unknown app '{name}' (known apps: {known})")]
    UnknownApp { name: String, known: String },
}

/// Errors from ordering a dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// An edge references a node that is not part of the node set.
    #[error("unknown node '{node}' referenced by a dependency edge")]
    UnknownNode { node: String },

    /// The graph contains a cycle. `path` starts and ends with the same node.
    #[error("dependency cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },
}

/// Errors from provider registration and lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Two tasks export the same provider into the same scope instance.
    #[error("provider '{provider}' is exported twice in scope '{scope}' (by {first} and {second})")]
    DuplicateExport {
        provider: String,
        scope: String,
        first: String,
        second: String,
    },

    /// A required provider value was not present.
    #[error("provider '{provider}' is not available")]
    Missing { provider: String },

    /// A provider value exists but holds a different type than the token.
    #[error("provider '{provider}' does not hold a value of type {expected}")]
    TypeMismatch {
        provider: String,
        expected: &'static str,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
