//! Command-line interface: argument parsing and dispatch to the pipelines.
//!
//! This module is glue only. Each subcommand builds its settings and
//! collaborators, calls into the library module that does the work, and turns
//! the outcome into an `anyhow::Result` for `main`.
//!
//! - `init`   → [`crate::scaffold::init`]
//! - `build`  → [`crate::build::build`] with a [`CommandCompiler`]
//! - `deploy` → [`crate::deploy::deploy`] with a [`DeployClient`]
//!
//! A build in which any file failed returns an error, so the process exits
//! non-zero even though the other bundles were written.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::build::build;
use crate::compiler::CommandCompiler;
use crate::deploy::deploy;
use crate::scaffold::init;
use crate::settings::Settings;
use crate::upload::DeployClient;

/// CLI for rsd: scaffold, bundle and deploy remote scripts.
#[derive(Parser, Debug)]
#[clap(
    name = "rsd",
    version,
    about = "Scaffold, bundle and deploy remote scripts to an HTTP endpoint"
)]
pub struct Cli {
    /// Project directory (defaults to the current directory)
    #[clap(short = 'C', long, global = true, default_value = ".")]
    pub project_dir: PathBuf,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Creates default configuration.
    Init,
    /// Builds JavaScript bundles.
    Build,
    /// Deploys the bundles to a server.
    Deploy,
}

impl Commands {
    pub fn name(self) -> &'static str {
        match self {
            Commands::Init => "init",
            Commands::Build => "build",
            Commands::Deploy => "deploy",
        }
    }
}

/// Async entrypoint shared by `main` and the integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    let command = cli.command.name();
    tracing::info!(command, project_dir = %cli.project_dir.display(), "Starting command");

    let result = match cli.command {
        Commands::Init => run_init(cli.project_dir),
        Commands::Build => run_build(cli.project_dir).await,
        Commands::Deploy => run_deploy(cli.project_dir).await,
    };

    match &result {
        Ok(()) => tracing::info!(command, "Command complete"),
        Err(e) => tracing::error!(command, error = %e, "Command failed"),
    }
    result
}

fn run_init(project_dir: PathBuf) -> Result<()> {
    let written = init(&project_dir)
        .with_context(|| format!("failed to initialise {}", project_dir.display()))?;
    println!("Created {} default files in {}", written.len(), project_dir.display());
    Ok(())
}

async fn run_build(project_dir: PathBuf) -> Result<()> {
    let settings = Settings::load(&project_dir).context("failed to load settings")?;
    let compiler = CommandCompiler::from_settings(&settings)?;

    let report = build(&settings, &compiler).await?;
    println!(
        "Built {} bundle(s) into {}",
        report.built.len(),
        settings.build_dir().display()
    );

    if !report.is_success() {
        for failed in &report.failed {
            eprintln!("[ERROR] {}: {}", failed.source.display(), failed.error);
        }
        anyhow::bail!(
            "{} of {} file(s) failed to build",
            report.failed.len(),
            report.failed.len() + report.built.len()
        );
    }
    Ok(())
}

async fn run_deploy(project_dir: PathBuf) -> Result<()> {
    let settings = Settings::load(&project_dir).context("failed to load settings")?;
    let client = DeployClient::from_settings(&settings).context("failed to configure deploy client")?;

    let report = deploy(&settings, &client).await.context("deploy failed")?;
    println!("Deployed {} file(s)", report.packaged);
    if !report.backed_up.is_empty() {
        println!(
            "Backed up {} file(s) into {}",
            report.backed_up.len(),
            settings.backups_dir().display()
        );
    }
    Ok(())
}
