//! Phase failure reporting with recovery guidance.

use crate::error::MigrationError;
use crate::orchestrator::RunState;
use colmigrate_core::SessionError;
use std::fmt;
use tracing::{error, warn, Level};

/// An error that aborted a phase, with the phase it happened in.
#[derive(Debug)]
pub struct PhaseFailure {
    /// Phase running when the error occurred
    pub phase: RunState,
    /// The error that occurred
    pub error: MigrationError,
}

impl PhaseFailure {
    /// Create new failure context.
    pub fn new(phase: RunState, error: MigrationError) -> Self {
        PhaseFailure { phase, error }
    }

    /// Whether the failure is the designed negative outcome of a compliance check.
    pub fn is_compliance(&self) -> bool {
        matches!(self.error, MigrationError::Compliance(_))
    }

    /// Get recovery steps for the error kind.
    pub fn recovery_steps(&self) -> Vec<String> {
        let steps: &[&str] = match &self.error {
            MigrationError::SchemaLookup { .. } => &[
                "1. Check that the keyspace and table names are spelled correctly",
                "2. Verify the table exists on the configured cluster",
            ],
            MigrationError::Compliance(_) => &[
                "1. Compare the column names and types of both tables",
                "2. Alter the target table so every source column has a same-name, same-type counterpart",
            ],
            MigrationError::Coercion { .. } => &[
                "1. Fix the malformed field in the input file",
                "2. Check the file's column order matches the target table",
                "3. Check the configured delimiter and header flag",
            ],
            MigrationError::FileAccess { .. } => &[
                "1. Check that the path provided is correct",
                "2. Verify read/write permissions on the file and its directory",
            ],
            MigrationError::Write { .. } => &[
                "1. Check cluster health and node availability",
                "2. Lower insertionBatch to reduce write pressure",
                "3. Re-run the insertion; rows already written are overwritten in place",
            ],
            MigrationError::Session(SessionError::Connection(_)) => &[
                "1. Check the configured endpoints and port",
                "2. Verify the cluster is running and reachable",
            ],
            MigrationError::Session(SessionError::BindArity { .. }) => &[
                "1. Check that every record has one field per target column",
                "2. Check the configured delimiter",
            ],
            MigrationError::Config(_) => &["1. Fix the settings file and retry"],
            MigrationError::Csv(_) => &["1. Input file is malformed or not valid UTF-8"],
            _ => &["1. Check logs for more details"],
        };
        steps.iter().map(|s| s.to_string()).collect()
    }

    /// Error message with recovery suggestions.
    pub fn detailed_message(&self) -> String {
        format!(
            "Error while {}: {}\n\nRecovery:\n{}",
            self.phase,
            self.error,
            self.recovery_steps().join("\n")
        )
    }

    /// Log the failure with its recovery steps.
    ///
    /// A compliance mismatch is logged as a warning: the run stopped before any data
    /// was moved.
    pub fn log(&self) {
        if self.level() == Level::WARN {
            warn!(phase = %self.phase, "{}", self.detailed_message());
        } else {
            error!(phase = %self.phase, "{}", self.detailed_message());
        }
    }

    /// Severity the failure is logged at.
    pub fn level(&self) -> Level {
        if self.is_compliance() {
            Level::WARN
        } else {
            Level::ERROR
        }
    }
}

impl fmt::Display for PhaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.phase, self.error)
    }
}

impl std::error::Error for PhaseFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
