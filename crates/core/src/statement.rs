//! Prepared and bound statements, plus connection pool load snapshots.

use crate::error::SessionError;
use crate::types::{Column, CqlValue};
use std::sync::Arc;

/// A statement prepared by the cluster, ready to have values bound.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedStatement {
    /// Statement text as sent to `prepare`
    pub cql: String,
    /// Keyspace the statement targets
    pub keyspace: String,
    /// Table the statement targets
    pub table: String,
    /// Bind marker metadata, one entry per `?`
    pub bind_markers: Vec<Column>,
}

impl PreparedStatement {
    /// Number of values `bind` expects.
    pub fn placeholder_count(&self) -> usize {
        self.bind_markers.len()
    }

    /// Bind one row of values, positionally.
    ///
    /// Fails with [`SessionError::BindArity`] when the value count differs from the
    /// placeholder count.
    pub fn bind(self: &Arc<Self>, values: Vec<CqlValue>) -> Result<BoundStatement, SessionError> {
        if values.len() != self.placeholder_count() {
            return Err(SessionError::BindArity {
                expected: self.placeholder_count(),
                actual: values.len(),
            });
        }

        Ok(BoundStatement {
            prepared: Arc::clone(self),
            values,
        })
    }
}

/// A prepared statement with one row of values bound.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundStatement {
    /// Statement the values were bound against
    pub prepared: Arc<PreparedStatement>,
    /// Values, aligned with `prepared.bind_markers`
    pub values: Vec<CqlValue>,
}

/// In-flight request count on one connected host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostLoad {
    /// Host address
    pub address: String,
    /// Requests sent and not yet answered
    pub in_flight: usize,
}

/// Point-in-time view of a session's connection pool.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolState {
    /// Load per connected host
    pub hosts: Vec<HostLoad>,
    /// Configured ceiling of concurrent requests per connection
    pub max_requests_per_connection: usize,
}

impl PoolState {
    /// Sum of in-flight requests across all connected hosts.
    pub fn total_in_flight(&self) -> usize {
        self.hosts.iter().map(|h| h.in_flight).sum()
    }
}
