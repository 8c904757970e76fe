//! Command-line runner for clusterstage suites.

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use clusterstage::config::SuiteConfig;
use clusterstage::events::LoggingEventSink;
use clusterstage::observability::{init_tracing, LogFormat};
use clusterstage::scenario::{Collaborators, ScenarioEnv, ScenarioKind, Suite, SuiteMode};
use clusterstage::state::FileStateStore;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!(error = %format!("{e:#}"), "Suite aborted");
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    init_tracing(LogFormat::from(cli.log_format), &cli.log_level)?;

    let settings = load_settings(&cli).await?;
    let stages = cli.stage_config();
    info!(
        work_dir = %settings.work_dir.display(),
        mode = ?settings.mode,
        skipped = ?stages.skipped_stages(),
        "Starting suite"
    );

    let collaborators = Collaborators::command_backed(&settings)?;
    let env = ScenarioEnv::new(
        settings,
        Arc::new(FileStateStore::new()),
        collaborators,
        stages,
    )
    .with_sink(Arc::new(LoggingEventSink::default()));

    let report = Suite::new(env).run().await?;
    println!("{}", report.summary());

    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&report)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "Report written");
    }

    Ok(report.is_success())
}

/// File, then environment, then flags.
async fn load_settings(cli: &Cli) -> Result<SuiteConfig> {
    let mut settings = match &cli.config {
        Some(path) => SuiteConfig::from_file(path).await?,
        None => SuiteConfig::default(),
    };
    settings.apply_overrides(std::env::vars());

    if let Some(dir) = &cli.work_dir {
        settings.work_dir.clone_from(dir);
    }
    if let Some(mode) = cli.mode {
        settings.mode = SuiteMode::from(mode);
    }
    if !cli.scenarios.is_empty() {
        settings.scenarios = cli.scenarios.iter().copied().map(ScenarioKind::from).collect();
    }

    settings.validate()?;
    Ok(settings)
}
