//! CLI binary for table migration.

use anyhow::{bail, Context};
use clap::Parser;
use colmigrate_core::{ClusterConnector, FixtureFile, MemoryConnector};
use colmigrate_migration_tools::cli::{CheckArgs, Cli, Commands, CommonArgs, RunArgs};
use colmigrate_migration_tools::{MigrationOrchestrator, MigrationSettings, RunReport};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Commands::Run(args) => args.common.verbose,
        Commands::Check(args) => args.common.verbose,
    };
    init_tracing(verbose);

    let result = match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Check(args) => cmd_check(args).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Connector for the command. Only fixture-backed clusters are linked into this binary.
fn connector(common: &CommonArgs) -> anyhow::Result<(Arc<dyn ClusterConnector>, Option<MemoryConnector>)> {
    let Some(path) = &common.fixture else {
        bail!("no cluster driver is linked into this build; pass --fixture <JSON> to run against in-memory clusters");
    };
    let fixture = FixtureFile::load(path)
        .with_context(|| format!("failed to load fixture {}", path.display()))?;
    let memory = MemoryConnector::from_fixture(&fixture);
    info!(clusters = fixture.clusters.len(), "Loaded fixture {}", path.display());
    Ok((Arc::new(memory.clone()), Some(memory)))
}

fn load_settings(path: &Path) -> anyhow::Result<MigrationSettings> {
    MigrationSettings::load(path).with_context(|| format!("failed to load settings {}", path.display()))
}

fn print_report(report: &RunReport) {
    println!("Run:      {}", report.run_id);
    println!("Mode:     {}", report.mode);
    if let Some(extraction) = &report.stats.extraction {
        println!("Extract:  {}", extraction.summary());
    }
    if let Some(insertion) = &report.stats.insertion {
        println!("Insert:   {}", insertion.summary());
    }
    if let Some(compliance) = &report.compliance {
        println!("Schema:   {}", compliance.summary());
    }
    match &report.failure {
        None => println!("Status:   OK"),
        Some(failure) => {
            let phase = report.failed_phase.map(|p| p.to_string()).unwrap_or_default();
            println!("Status:   FAILED while {}: {}", phase, failure);
            for step in &report.recovery_steps {
                println!("          {}", step);
            }
        }
    }
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<bool> {
    let settings = load_settings(&args.common.config)?;
    let mode = args.mode.unwrap_or(settings.task_to_execute);
    let (connector, memory) = connector(&args.common)?;

    let mut orchestrator = MigrationOrchestrator::new(settings, connector);
    let report = orchestrator.run(mode).await;
    print_report(&report);

    if let (Some(out), Some(memory)) = (&args.fixture_out, &memory) {
        memory
            .to_fixture()
            .save(out)
            .with_context(|| format!("failed to write fixture {}", out.display()))?;
        info!("Wrote cluster state to {}", out.display());
    }
    Ok(report.is_success())
}

async fn cmd_check(args: CheckArgs) -> anyhow::Result<bool> {
    let settings = load_settings(&args.common.config)?;
    let (connector, _) = connector(&args.common)?;

    let mut orchestrator = MigrationOrchestrator::new(settings, connector);
    let report = orchestrator.check_compliance().await?;
    println!("{}", report.summary());
    Ok(report.compliant)
}
