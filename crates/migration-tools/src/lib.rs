//! Migration tools for moving wide-column table data.
//!
//! Three modes are supported: extraction of a source table into a delimited file,
//! insertion of a delimited file into a target table, and an end-to-end transfer
//! between two clusters gated by a schema compliance check.

#![warn(missing_docs)]

pub mod catalog;
pub mod cli;
pub mod codec;
pub mod coercion;
pub mod compliance;
pub mod config;
pub mod end_to_end;
pub mod error;
pub mod error_handler;
pub mod executor;
pub mod extraction;
pub mod insertion;
pub mod orchestrator;
pub mod progress;
pub mod retry;
pub mod session_handle;
pub mod stats;

pub use catalog::get_columns;
pub use codec::{decode_line, encode_row, RecordReader};
pub use coercion::coerce;
pub use compliance::{is_compliant, ComplianceReport};
pub use config::{MigrationMode, MigrationSettings};
pub use error::{MigrationError, MigrationResult};
pub use error_handler::PhaseFailure;
pub use executor::{BatchInsertExecutor, BatchOutcome, BatchQueue};
pub use insertion::{FileInserter, InsertConfig, InsertTemplate};
pub use orchestrator::{MigrationOrchestrator, RunReport, RunState};
pub use progress::TransferProgress;
pub use retry::WriteTimeoutRetryPolicy;
pub use session_handle::{SessionHandle, Side};
pub use stats::{ExtractionStats, RunStats, TransferStats};
