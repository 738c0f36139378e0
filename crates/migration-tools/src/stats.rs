//! Per-phase statistics.

use crate::executor::BatchOutcome;
use colmigrate_observability::format_elapsed;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Statistics about an extraction to file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionStats {
    /// Rows written to the file
    pub rows_written: usize,
    /// Columns per row
    pub columns: usize,
    /// Output file
    pub path: PathBuf,
    /// Time spent in the phase
    pub elapsed: Duration,
}

impl ExtractionStats {
    /// Get human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Extracted {} rows ({} columns) to {} in {}",
            self.rows_written,
            self.columns,
            self.path.display(),
            format_elapsed(self.elapsed)
        )
    }
}

/// Statistics about rows inserted into a target table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransferStats {
    /// Rows read from the file or source table
    pub rows_read: usize,
    /// Rows acknowledged by the target
    pub rows_written: usize,
    /// Rows whose write failed
    pub rows_failed: usize,
    /// Batches executed
    pub batches: usize,
    /// Time spent in the phase
    pub elapsed: Duration,
}

impl TransferStats {
    /// Fold one executed batch into the totals.
    pub fn absorb(&mut self, outcome: &BatchOutcome) {
        self.batches += 1;
        self.rows_written += outcome.succeeded;
        self.rows_failed += outcome.failed();
    }

    /// Get human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Inserted {} of {} rows in {} batch(es) in {}",
            self.rows_written,
            self.rows_read,
            self.batches,
            format_elapsed(self.elapsed)
        )
    }
}

/// Statistics for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    /// Set when an extraction to file ran
    pub extraction: Option<ExtractionStats>,
    /// Set when rows were inserted into the target
    pub insertion: Option<TransferStats>,
}
