//! Project configuration: `<project>/baseplate.yaml`.
//!
//! A missing file yields the defaults; a malformed one is a
//! [`ConfigError::Parse`] carrying the path. Saves go through a `.tmp`
//! sibling and a rename so a crash never leaves a truncated config behind.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

pub const CONFIG_FILE: &str = "baseplate.yaml";

/// An app inside the project, addressed by name from service actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
    /// Relative to the project root.
    pub directory: PathBuf,
}

/// Sync engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Holds the file-id map and the generated baseline, relative to the app.
    pub state_directory: PathBuf,
    /// Default snapshot location, relative to the app.
    pub snapshot_directory: PathBuf,
    /// Extra copy of the generated (pre-merge) tree for external diff tools.
    pub generated_mirror_directory: Option<PathBuf>,
    /// File names that keep an otherwise empty directory alive.
    pub metadata_files: Vec<String>,
    /// File names that do not count when deciding whether a directory is empty.
    pub disposable_files: Vec<String>,
    pub command_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            state_directory: PathBuf::from(".baseplate"),
            snapshot_directory: PathBuf::from(".baseplate-snapshot"),
            generated_mirror_directory: None,
            metadata_files: vec![".gitkeep".to_string()],
            disposable_files: vec![".DS_Store".to_string()],
            command_timeout_secs: 300,
        }
    }
}

/// Action worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub timeout_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

/// Root of `baseplate.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseplateConfig {
    pub apps: Vec<AppConfig>,
    pub sync: SyncSettings,
    pub worker: WorkerSettings,
}

impl BaseplateConfig {
    /// Absolute directory of `app` under `project_root`.
    pub fn app_directory(&self, project_root: &Path, app: &str) -> Result<PathBuf, ConfigError> {
        self.apps
            .iter()
            .find(|candidate| candidate.name == app)
            .map(|found| project_root.join(&found.directory))
            .ok_or_else(|| ConfigError::UnknownApp {
                name: app.to_string(),
                known: if self.apps.is_empty() {
                    "none".to_string()
                } else {
                    self.apps
                        .iter()
                        .map(|a| a.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                },
            })
    }
}

/// `<project_root>/baseplate.yaml`. Pure, no I/O.
pub fn config_path_at(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_FILE)
}

/// Load the configuration, falling back to defaults when the file is absent.
pub fn load_at(project_root: &Path) -> Result<BaseplateConfig, ConfigError> {
    let path = config_path_at(project_root);
    if !path.exists() {
        return Ok(BaseplateConfig::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(BaseplateConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
}

/// Atomically save the configuration: serialize → `.yaml.tmp` → `rename`.
pub fn save_at(project_root: &Path, config: &BaseplateConfig) -> Result<(), ConfigError> {
    std::fs::create_dir_all(project_root).map_err(|e| io_err(project_root, e))?;
    let path = config_path_at(project_root);
    let tmp = path.with_extension("yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(())
}
