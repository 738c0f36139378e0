//! Structured metric log entries for migration runs.
//!
//! Metrics are emitted as `tracing` events carrying a `metric` field so any subscriber
//! can pick them out; process-wide totals are kept in atomics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{info, warn};

static ROWS_WRITTEN_TOTAL: AtomicU64 = AtomicU64::new(0);
static WRITE_FAILURES_TOTAL: AtomicU64 = AtomicU64::new(0);
static WRITE_RETRIES_TOTAL: AtomicU64 = AtomicU64::new(0);

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Formats a duration as `<h>h:<m>m:<s>s:<ms>ms`.
pub fn format_elapsed(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    format!("{}h:{}m:{}s:{}ms", hours, minutes, seconds, millis)
}

/// Records how long a named phase or operation took.
pub fn record_phase_elapsed(name: &str, duration: Duration) {
    info!(
        metric = "phase_elapsed_ms",
        phase = name,
        latency_ms = duration_ms(duration),
        "Time elapsed ({}): {}",
        name,
        format_elapsed(duration)
    );
}

/// Records a joined insert batch and bumps the rows-written counter.
pub fn record_batch_latency(rows: usize, failed: usize, duration: Duration) {
    let succeeded = rows.saturating_sub(failed) as u64;
    let total = ROWS_WRITTEN_TOTAL.fetch_add(succeeded, Ordering::Relaxed) + succeeded;
    info!(
        metric = "batch_latency_ms",
        rows,
        failed,
        latency_ms = duration_ms(duration),
        rows_written_total = total
    );
}

/// Records a failed write, incrementing the failure counter.
pub fn record_write_failure(keyspace: &str, table: &str, error: &str) {
    let total = WRITE_FAILURES_TOTAL.fetch_add(1, Ordering::Relaxed) + 1;
    warn!(
        metric = "write_failure",
        keyspace,
        table,
        error,
        write_failures_total = total
    );
}

/// Records a retried write timeout.
pub fn record_write_retry(retry_count: u32, delay: Duration) {
    let total = WRITE_RETRIES_TOTAL.fetch_add(1, Ordering::Relaxed) + 1;
    info!(
        metric = "write_retry",
        retry_count,
        delay_ms = duration_ms(delay),
        write_retries_total = total
    );
}

/// Records that the executor paused submissions for backpressure.
pub fn record_backpressure_wait(in_flight: usize, max_requests: usize, waited: Duration) {
    info!(
        metric = "backpressure_wait_ms",
        in_flight,
        max_requests,
        latency_ms = duration_ms(waited)
    );
}

/// Rows written successfully since process start.
pub fn rows_written_total() -> u64 {
    ROWS_WRITTEN_TOTAL.load(Ordering::Relaxed)
}

/// Failed writes since process start.
pub fn write_failures_total() -> u64 {
    WRITE_FAILURES_TOTAL.load(Ordering::Relaxed)
}
