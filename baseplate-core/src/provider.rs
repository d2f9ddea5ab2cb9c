//! Provider registry: scoped export table plus type-erased provider values.
//!
//! The registry is built once per generation pass, after the bundle tree has
//! been flattened. Scope instances are named by the id of the bundle that
//! owns them, so two sibling packages that both declare `package` get two
//! independent export tables.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ProviderError;
use crate::types::{ExportScope, ProviderToken};

/// A scope declared by one particular bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeInstance {
    pub owner: String,
    pub scope: ExportScope,
}

impl ScopeInstance {
    pub fn new(owner: impl Into<String>, scope: ExportScope) -> Self {
        Self {
            owner: owner.into(),
            scope,
        }
    }

    /// The implicit scope every bundle owns for exports that name no scope.
    pub fn default_for(owner: impl Into<String>) -> Self {
        Self::new(owner, ExportScope::DEFAULT)
    }

    pub fn is_default(&self) -> bool {
        self.scope == ExportScope::DEFAULT
    }
}

impl fmt::Display for ScopeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            write!(f, "{}", self.owner)
        } else {
            write!(f, "{}@{}", self.scope, self.owner)
        }
    }
}

/// The task that registered an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exporter {
    /// Index of the task in the flattened task list.
    pub task: usize,
    /// Human readable task id for error messages.
    pub label: String,
}

/// Export table keyed by (scope instance, provider name).
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    exports: HashMap<(ScopeInstance, &'static str), Exporter>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `exporter` as the source of `provider` within `instance`.
    ///
    /// At most one exporter per (provider, scope instance).
    pub fn register(
        &mut self,
        instance: ScopeInstance,
        provider: &'static str,
        exporter: Exporter,
    ) -> Result<(), ProviderError> {
        let key = (instance, provider);
        if let Some(existing) = self.exports.get(&key) {
            return Err(ProviderError::DuplicateExport {
                provider: provider.to_string(),
                scope: key.0.to_string(),
                first: existing.label.clone(),
                second: exporter.label,
            });
        }
        self.exports.insert(key, exporter);
        Ok(())
    }

    /// Resolve `provider` for a consumer whose visible scopes are `chain`,
    /// nearest first. The first scope instance holding an export wins.
    pub fn resolve(&self, chain: &[ScopeInstance], provider: &'static str) -> Option<&Exporter> {
        chain
            .iter()
            .find_map(|instance| self.exports.get(&(instance.clone(), provider)))
    }

    pub fn len(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }
}

/// Type-erased provider value.
pub type ProviderValue = Arc<dyn Any + Send + Sync>;

/// Provider values keyed by provider name, read through typed tokens.
#[derive(Clone, Default)]
pub struct ProviderMap {
    values: HashMap<&'static str, ProviderValue>,
}

impl ProviderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Send + Sync + 'static>(&mut self, token: &ProviderToken<T>, value: T) {
        self.values.insert(token.name(), Arc::new(value));
    }

    /// Builder form of [`ProviderMap::insert`].
    pub fn with<T: Send + Sync + 'static>(mut self, token: &ProviderToken<T>, value: T) -> Self {
        self.insert(token, value);
        self
    }

    pub fn get<T: 'static>(&self, token: &ProviderToken<T>) -> Option<&T> {
        self.values
            .get(token.name())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Like [`ProviderMap::get`] but distinguishes "absent" from "wrong type".
    pub fn require<T: 'static>(&self, token: &ProviderToken<T>) -> Result<&T, ProviderError> {
        let value = self
            .values
            .get(token.name())
            .ok_or_else(|| ProviderError::Missing {
                provider: token.name().to_string(),
            })?;
        value
            .downcast_ref::<T>()
            .ok_or_else(|| ProviderError::TypeMismatch {
                provider: token.name().to_string(),
                expected: type_name::<T>(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get_erased(&self, name: &str) -> Option<ProviderValue> {
        self.values.get(name).cloned()
    }

    pub fn insert_erased(&mut self, name: &'static str, value: ProviderValue) {
        self.values.insert(name, value);
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for ProviderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.values.keys().collect();
        names.sort();
        f.debug_struct("ProviderMap").field("names", &names).finish()
    }
}
