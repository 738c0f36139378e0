//! colmigrate-core
//!
//! Data model shared by the migration pipeline, and the narrow set of cluster client
//! capabilities it depends on, expressed as async traits. An in-memory cluster
//! implementing those traits backs the test suites and the offline CLI mode.

#![warn(missing_docs)]

pub mod error;
pub mod memory;
pub mod retry;
pub mod statement;
pub mod traits;
pub mod types;

pub use error::SessionError;
pub use memory::{FixtureFile, MemoryCluster, MemoryConnector, MemorySession};
pub use retry::{
    Consistency, ReadTimeoutInfo, RetryDecision, RetryPolicy, UnavailableInfo, WriteTimeoutInfo,
    WriteType,
};
pub use statement::{BoundStatement, HostLoad, PoolState, PreparedStatement};
pub use traits::{ClusterConnector, ClusterSession, ConnectOptions};
pub use types::{ClusterEndpoint, Column, CqlValue, DataTypeTag, Field, ResultSet};
