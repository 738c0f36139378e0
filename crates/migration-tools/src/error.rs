//! Error types for migration operations.

use colmigrate_core::{DataTypeTag, SessionError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during migration operations.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// Column metadata could not be read for a keyspace/table pair
    #[error("Schema lookup failed for {keyspace}.{table}: {source}")]
    SchemaLookup {
        /// Keyspace probed
        keyspace: String,
        /// Table probed
        table: String,
        /// Underlying client error
        #[source]
        source: SessionError,
    },

    /// Source and target tables are not structurally equivalent
    #[error("Tables are not compliant: {0}")]
    Compliance(String),

    /// A raw field could not be converted to its column type
    #[error("Cannot coerce '{text}' to {data_type}: {reason}")]
    Coercion {
        /// Raw field text
        text: String,
        /// Column type the text was coerced against
        data_type: DataTypeTag,
        /// Parser message
        reason: String,
    },

    /// Input file missing or unreadable
    #[error("Cannot access file {path}: {reason}")]
    FileAccess {
        /// Offending path
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// One or more writes in a batch failed
    #[error("{failed} of {total} writes failed; first error: {first_error}")]
    Write {
        /// Failed writes
        failed: usize,
        /// Writes submitted
        total: usize,
        /// Message of the first failure observed
        first_error: String,
    },

    /// Cluster client error outside schema lookup
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration or input error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Delimited file parse error
    #[error("Delimited file error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrationError {
    /// Wrap a client error raised while probing a table's columns.
    pub fn schema_lookup(keyspace: &str, table: &str, source: SessionError) -> Self {
        MigrationError::SchemaLookup {
            keyspace: keyspace.to_string(),
            table: table.to_string(),
            source,
        }
    }
}

/// Result type for migration operations.
pub type MigrationResult<T> = Result<T, MigrationError>;
