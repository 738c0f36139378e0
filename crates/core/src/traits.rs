//! Abstractions over a wide-column cluster client.
//!
//! The migration pipeline needs only a handful of capabilities from a driver: run a
//! query and get rows back, prepare a parameterized statement, execute a bound
//! statement without blocking, and report connection pool load. Any driver that
//! provides those can sit behind these traits.

use crate::error::SessionError;
use crate::retry::RetryPolicy;
use crate::statement::{BoundStatement, PoolState, PreparedStatement};
use crate::types::{ClusterEndpoint, ResultSet};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// A connected session against one cluster.
///
/// Sessions are shared across concurrently running write tasks, so every method takes
/// `&self` and implementations must be `Send + Sync`.
#[async_trait]
pub trait ClusterSession: Send + Sync {
    /// Run an unparameterized query and collect the full result.
    ///
    /// # Scenarios
    ///
    /// **Success case:** Returns column metadata and all rows.
    ///
    /// **Missing table:** Returns `SessionError::TableNotFound` or
    /// `SessionError::KeyspaceNotFound`.
    async fn query(&self, cql: &str) -> Result<ResultSet, SessionError>;

    /// Prepare a parameterized statement once for repeated binding.
    async fn prepare(&self, cql: &str) -> Result<Arc<PreparedStatement>, SessionError>;

    /// Execute one bound statement.
    ///
    /// Write timeouts are first offered to the session's retry policy, if any.
    async fn execute(&self, statement: &BoundStatement) -> Result<(), SessionError>;

    /// Current in-flight load of the session's connection pool.
    fn pool_state(&self) -> PoolState;

    /// Close the session and release its connections.
    async fn close(&self) -> Result<(), SessionError>;

    /// Whether `close` has already run.
    fn is_closed(&self) -> bool;
}

/// Options for building a session.
#[derive(Clone)]
pub struct ConnectOptions {
    /// Contact points and port
    pub endpoint: ClusterEndpoint,
    /// Policy consulted on write timeout, read timeout and unavailable errors
    pub retry_policy: Option<Arc<dyn RetryPolicy>>,
}

impl ConnectOptions {
    /// Options without a retry policy.
    pub fn new(endpoint: ClusterEndpoint) -> Self {
        ConnectOptions {
            endpoint,
            retry_policy: None,
        }
    }

    /// Attach a retry policy.
    pub fn with_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = Some(policy);
        self
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("endpoint", &self.endpoint)
            .field("retry_policy", &self.retry_policy.is_some())
            .finish()
    }
}

/// Builds sessions for a cluster.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    /// Connect to the cluster described by `options`.
    async fn connect(&self, options: ConnectOptions) -> Result<Arc<dyn ClusterSession>, SessionError>;
}
