pub mod diff;
pub mod snapshot;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use baseplate_core::{config, BaseplateConfig};
use clap::Args;

/// The app a command works on.
#[derive(Args, Debug, Clone)]
pub struct AppSelector {
    /// App name as declared in `baseplate.yaml`.
    pub app: String,

    /// Project root holding `baseplate.yaml`.
    #[arg(long, default_value = ".")]
    pub project: PathBuf,
}

impl AppSelector {
    pub fn load_config(&self) -> Result<BaseplateConfig> {
        config::load_at(&self.project)
            .with_context(|| format!("failed to load config from '{}'", self.project.display()))
    }

    /// Config plus the app's absolute directory.
    pub fn resolve(&self) -> Result<(BaseplateConfig, PathBuf)> {
        let config = self.load_config()?;
        let app_dir = config.app_directory(&self.project, &self.app)?;
        Ok((config, app_dir))
    }
}
