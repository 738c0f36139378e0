//! Retry policy installed on the target session.

use crate::config::RetrySettings;
use colmigrate_core::{ReadTimeoutInfo, RetryDecision, RetryPolicy, UnavailableInfo, WriteTimeoutInfo};
use colmigrate_observability as obs;
use std::time::Duration;
use tracing::warn;

/// Retries timed-out writes after a fixed delay at the original consistency.
///
/// Read timeouts and unavailable errors are never retried.
#[derive(Debug, Clone)]
pub struct WriteTimeoutRetryPolicy {
    delay: Duration,
    max_retries: Option<u32>,
}

impl WriteTimeoutRetryPolicy {
    /// Create a policy. `max_retries` of `None` retries without limit.
    pub fn new(delay: Duration, max_retries: Option<u32>) -> Self {
        WriteTimeoutRetryPolicy { delay, max_retries }
    }

    /// Build the policy from run settings.
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(settings.delay(), settings.write_timeout_max_retries)
    }
}

impl RetryPolicy for WriteTimeoutRetryPolicy {
    fn on_write_timeout(&self, info: &WriteTimeoutInfo) -> RetryDecision {
        if let Some(max) = self.max_retries {
            if info.retry_count >= max {
                warn!(
                    retry_count = info.retry_count,
                    max_retries = max,
                    "write timeout retries exhausted"
                );
                return RetryDecision::Rethrow;
            }
        }

        obs::record_write_retry(info.retry_count + 1, self.delay);
        RetryDecision::Retry {
            consistency: info.consistency,
            delay: self.delay,
        }
    }

    fn on_read_timeout(&self, _info: &ReadTimeoutInfo) -> RetryDecision {
        RetryDecision::Rethrow
    }

    fn on_unavailable(&self, _info: &UnavailableInfo) -> RetryDecision {
        RetryDecision::Rethrow
    }
}
