//! Error types surfaced by cluster client implementations.
//!
//! These describe driver-level failures only. Pipeline errors (coercion, compliance,
//! file access, aggregated write failures) live in the migration crate and wrap
//! [`SessionError`] where a client call is the cause.

use thiserror::Error;

/// Errors returned by [`crate::ClusterSession`] and [`crate::ClusterConnector`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Could not reach any contact point
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Keyspace does not exist
    #[error("Keyspace not found: {0}")]
    KeyspaceNotFound(String),

    /// Table does not exist in the keyspace
    #[error("Table not found: {keyspace}.{table}")]
    TableNotFound {
        /// Keyspace searched
        keyspace: String,
        /// Missing table
        table: String,
    },

    /// Query text could not be understood by the server
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Bound value count differs from the prepared statement's markers
    #[error("Bind arity mismatch: statement expects {expected} values, got {actual}")]
    BindArity {
        /// Bind markers in the prepared statement
        expected: usize,
        /// Values supplied
        actual: usize,
    },

    /// Bound value does not fit the column it targets
    #[error("Invalid value for column {column}: {message}")]
    InvalidValue {
        /// Target column
        column: String,
        /// Detail
        message: String,
    },

    /// Coordinator timed out waiting for write acknowledgements
    #[error("Write timeout: {received} of {required} replicas acknowledged")]
    WriteTimeout {
        /// Acknowledgements required by the consistency level
        required: u32,
        /// Acknowledgements received before the timeout
        received: u32,
    },

    /// Coordinator timed out waiting for read responses
    #[error("Read timeout: {received} of {required} replicas responded")]
    ReadTimeout {
        /// Responses required by the consistency level
        required: u32,
        /// Responses received before the timeout
        received: u32,
    },

    /// Not enough live replicas for the requested consistency
    #[error("Unavailable: {alive} of {required} replicas alive")]
    Unavailable {
        /// Replicas required by the consistency level
        required: u32,
        /// Replicas known alive
        alive: u32,
    },

    /// Session was already closed
    #[error("Session closed")]
    Closed,
}

impl SessionError {
    /// Whether the error means the addressed keyspace or table is missing.
    pub fn is_schema_missing(&self) -> bool {
        matches!(
            self,
            SessionError::KeyspaceNotFound(_) | SessionError::TableNotFound { .. }
        )
    }
}
