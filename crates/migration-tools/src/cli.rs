//! CLI interface for migration tools.

use crate::config::MigrationMode;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Wide-column table migration tools.
#[derive(Parser, Debug)]
#[command(name = "colmigrate")]
#[command(about = "Move table data between clusters and delimited files", long_about = None)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an extraction, insertion or end-to-end migration
    Run(RunArgs),
    /// Compare source and target table schemas without moving data
    Check(CheckArgs),
}

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Settings file
    #[arg(long, short, value_name = "FILE", default_value = "appsettings.json")]
    pub config: PathBuf,

    /// Serve clusters from an in-memory fixture instead of a live driver
    #[arg(long, value_name = "JSON")]
    pub fixture: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Shared options
    #[command(flatten)]
    pub common: CommonArgs,

    /// Override the settings file's taskToExecute
    #[arg(long, value_enum)]
    pub mode: Option<MigrationMode>,

    /// Write fixture cluster state here after the run
    #[arg(long, value_name = "JSON", requires = "fixture")]
    pub fixture_out: Option<PathBuf>,
}

/// Arguments for the check command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Shared options
    #[command(flatten)]
    pub common: CommonArgs,
}
