//! `baseplate status <app>`: drift of generated files since the last pass.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use baseplate_sync::{format_datetime_age, status_app, AppStatus, FileState};

use super::AppSelector;

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub target: AppSelector,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,

    /// List clean files too.
    #[arg(long)]
    pub all: bool,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "file")]
    path: String,
    #[tabled(rename = "status")]
    status: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let (config, app_dir) = self.target.resolve()?;
        let status = status_app(&app_dir, &config.sync)
            .with_context(|| format!("status check failed for '{}'", self.target.app))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&status).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        let (label, generated_at) = match &status {
            AppStatus::NeverGenerated => {
                println!("{} {} has never been generated.", indicator(None), self.target.app.bold());
                return Ok(());
            }
            AppStatus::Current { generated_at, .. } => ("CURRENT".green().bold(), *generated_at),
            AppStatus::Drifted { generated_at, .. } => ("DRIFTED".yellow().bold(), *generated_at),
        };
        let age = generated_at
            .map(format_datetime_age)
            .map(|age| format!("{age} ago"))
            .unwrap_or_else(|| "unknown".to_string());
        let files = status.files();
        println!(
            "{} | {} | {} generated file(s) | last generation {}",
            self.target.app.bold(),
            label,
            files.len(),
            age,
        );

        let rows: Vec<StatusTableRow> = files
            .iter()
            .filter(|file| self.all || file.state != FileState::Clean)
            .map(|file| StatusTableRow {
                path: file.path.clone(),
                status: format!("{} {}", indicator(Some(file.state)), state_label(file.state)),
            })
            .collect();
        if rows.is_empty() {
            return Ok(());
        }
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn state_label(state: FileState) -> &'static str {
    match state {
        FileState::Clean => "CLEAN",
        FileState::Modified => "MODIFIED",
        FileState::Missing => "MISSING",
        FileState::Unknown => "UNKNOWN",
    }
}

fn indicator(state: Option<FileState>) -> String {
    match state {
        None => "■".bright_black().bold().to_string(),
        Some(FileState::Clean) => "■".green().bold().to_string(),
        Some(FileState::Modified) => "■".yellow().bold().to_string(),
        Some(FileState::Missing) => "■".red().bold().to_string(),
        Some(FileState::Unknown) => "■".magenta().bold().to_string(),
    }
}
