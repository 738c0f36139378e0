//! Retry policy contract consulted by cluster clients.

use std::time::Duration;

/// Consistency level a request was issued with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Consistency {
    /// Any replica, including hinted handoff
    Any,
    /// One replica
    One,
    /// Two replicas
    Two,
    /// Majority of replicas
    Quorum,
    /// Majority of replicas in the local datacenter
    #[default]
    LocalQuorum,
    /// Every replica
    All,
}

/// Kind of write a timeout occurred on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteType {
    /// Single-partition write
    Simple,
    /// Logged batch
    Batch,
    /// Unlogged batch
    UnloggedBatch,
    /// Counter update
    Counter,
}

/// Details of a write timeout.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteTimeoutInfo {
    /// Consistency the write was issued with
    pub consistency: Consistency,
    /// Kind of write
    pub write_type: WriteType,
    /// Acknowledgements required
    pub required_acks: u32,
    /// Acknowledgements received
    pub received_acks: u32,
    /// Retries already attempted for this statement
    pub retry_count: u32,
}

/// Details of a read timeout.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadTimeoutInfo {
    /// Consistency the read was issued with
    pub consistency: Consistency,
    /// Responses required
    pub required_responses: u32,
    /// Responses received
    pub received_responses: u32,
    /// Whether the data replica responded
    pub data_retrieved: bool,
    /// Retries already attempted for this statement
    pub retry_count: u32,
}

/// Details of an unavailable error.
#[derive(Clone, Debug, PartialEq)]
pub struct UnavailableInfo {
    /// Consistency the request was issued with
    pub consistency: Consistency,
    /// Replicas required
    pub required_replicas: u32,
    /// Replicas alive
    pub alive_replicas: u32,
    /// Retries already attempted for this statement
    pub retry_count: u32,
}

/// What the client should do after a failed request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry at `consistency` after waiting `delay`
    Retry {
        /// Consistency for the retried request
        consistency: Consistency,
        /// Wait before retrying
        delay: Duration,
    },
    /// Surface the error to the caller
    Rethrow,
    /// Swallow the error and report success
    Ignore,
}

/// Policy consulted by a cluster client when a request fails with a retryable condition.
pub trait RetryPolicy: Send + Sync {
    /// Called when a write timed out on the coordinator.
    fn on_write_timeout(&self, info: &WriteTimeoutInfo) -> RetryDecision;

    /// Called when a read timed out on the coordinator.
    fn on_read_timeout(&self, info: &ReadTimeoutInfo) -> RetryDecision;

    /// Called when too few replicas were alive to serve the request.
    fn on_unavailable(&self, info: &UnavailableInfo) -> RetryDecision;
}
