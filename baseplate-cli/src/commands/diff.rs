//! `baseplate diff <app>`: working copies against the last generation.

use anyhow::{Context, Result};
use clap::Args;

use baseplate_sync::diff_app;

use super::AppSelector;

#[derive(Args, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub target: AppSelector,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let (config, app_dir) = self.target.resolve()?;
        let diffs =
            diff_app(&app_dir, &config.sync).with_context(|| format!("diff failed for '{}'", self.target.app))?;

        if diffs.is_empty() {
            println!("No differences for '{}'.", self.target.app);
            return Ok(());
        }

        for diff in diffs {
            print!("{}", diff.unified_diff);
            if !diff.unified_diff.ends_with('\n') {
                println!();
            }
        }
        Ok(())
    }
}
