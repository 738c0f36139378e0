//! Concurrent execution of bound insert statements under pool backpressure.

use crate::error::{MigrationError, MigrationResult};
use colmigrate_core::{BoundStatement, ClusterSession};
use colmigrate_observability as obs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Aggregate result of one executed batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// Statements submitted
    pub submitted: usize,
    /// Statements that completed successfully
    pub succeeded: usize,
    /// Messages of failed statements, in completion order
    pub failures: Vec<String>,
    /// Wall time from first submission to final join
    pub elapsed: Duration,
}

impl BatchOutcome {
    /// Number of failed statements.
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Whether every statement succeeded.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turn failures into [`MigrationError::Write`].
    pub fn into_result(self) -> MigrationResult<Self> {
        match self.failures.first() {
            None => Ok(self),
            Some(first) => Err(MigrationError::Write {
                failed: self.failures.len(),
                total: self.submitted,
                first_error: first.clone(),
            }),
        }
    }
}

/// Bound statements waiting for the next flush.
#[derive(Debug)]
pub struct BatchQueue {
    capacity: usize,
    pending: Vec<BoundStatement>,
}

impl BatchQueue {
    /// Create an empty queue flushed at `capacity` statements.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        BatchQueue {
            capacity,
            pending: Vec::with_capacity(capacity.min(4096)),
        }
    }

    /// Queue a statement. Returns `true` once the queue is due for a flush.
    pub fn push(&mut self, statement: BoundStatement) -> bool {
        self.pending.push(statement);
        self.is_full()
    }

    /// Whether the threshold is reached.
    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.capacity
    }

    /// Number of queued statements.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take every queued statement, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<BoundStatement> {
        std::mem::take(&mut self.pending)
    }
}

/// Submits statements as concurrent tasks, pausing whenever the session's pool is
/// saturated.
///
/// Load is the larger of the pool's reported in-flight count and the number of
/// submitted tasks that have not finished yet. A spawned task may not have reached the
/// pool when the next check runs, so the pool reading alone lags behind submissions.
///
/// Throttling starts once the load reaches the pool's per-connection ceiling and lasts
/// until it drops to half of that ceiling. The check is advisory: a submission racing a
/// completion can briefly overshoot the ceiling.
pub struct BatchInsertExecutor {
    session: Arc<dyn ClusterSession>,
    poll_interval: Duration,
    outstanding: Arc<AtomicUsize>,
}

/// Releases one outstanding slot when a write task ends, including on panic or abort.
struct OutstandingGuard(Arc<AtomicUsize>);

impl OutstandingGuard {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        OutstandingGuard(Arc::clone(counter))
    }
}

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl BatchInsertExecutor {
    /// Create an executor polling the pool every `poll_interval` while throttled.
    pub fn new(session: Arc<dyn ClusterSession>, poll_interval: Duration) -> Self {
        BatchInsertExecutor {
            session,
            poll_interval,
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Current load and the pool's ceiling.
    fn load(&self) -> (usize, usize) {
        let state = self.session.pool_state();
        let outstanding = self.outstanding.load(Ordering::SeqCst);
        (
            state.total_in_flight().max(outstanding),
            state.max_requests_per_connection,
        )
    }

    /// Wait until the pool can take another request.
    async fn wait_for_capacity(&self) {
        let (load, max) = self.load();
        if max == 0 || load < max {
            return;
        }

        let resume_at = max / 2;
        let started = Instant::now();
        debug!(in_flight = load, max, resume_at, "pool saturated, pausing submissions");
        loop {
            tokio::time::sleep(self.poll_interval).await;
            if self.load().0 <= resume_at {
                break;
            }
        }
        obs::record_backpressure_wait(load, max, started.elapsed());
    }

    /// Submit every statement, then wait for all of them to complete.
    ///
    /// Failures are collected rather than raised; statements that already succeeded
    /// stay written.
    pub async fn execute(&self, statements: Vec<BoundStatement>) -> BatchOutcome {
        let started = Instant::now();
        let submitted = statements.len();
        info!("Inserting {} records into table...", submitted);

        let mut tasks = JoinSet::new();
        for statement in statements {
            self.wait_for_capacity().await;
            let session = Arc::clone(&self.session);
            let guard = OutstandingGuard::acquire(&self.outstanding);
            tasks.spawn(async move {
                let _guard = guard;
                session.execute(&statement).await.map_err(|e| {
                    let prepared = &statement.prepared;
                    let message = e.to_string();
                    obs::record_write_failure(&prepared.keyspace, &prepared.table, &message);
                    message
                })
            });
        }

        let mut outcome = BatchOutcome {
            submitted,
            ..BatchOutcome::default()
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => outcome.succeeded += 1,
                Ok(Err(message)) => outcome.failures.push(message),
                Err(e) => outcome.failures.push(format!("write task aborted: {}", e)),
            }
        }

        outcome.elapsed = started.elapsed();
        obs::record_phase_elapsed("execute_insert", outcome.elapsed);
        obs::record_batch_latency(submitted, outcome.failed(), outcome.elapsed);
        outcome
    }

    /// Execute whatever is queued. An empty queue yields an empty outcome without
    /// touching the session.
    pub async fn flush(&self, queue: &mut BatchQueue) -> BatchOutcome {
        if queue.is_empty() {
            return BatchOutcome::default();
        }
        self.execute(queue.drain()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use colmigrate_core::{
        Column, CqlValue, DataTypeTag, HostLoad, MemoryCluster, PoolState, PreparedStatement,
        ResultSet, SessionError,
    };
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Session whose pool reports a scripted sequence of in-flight counts.
    struct ScriptedPool {
        readings: Mutex<VecDeque<usize>>,
        last: Mutex<usize>,
        max: usize,
        polls: Mutex<usize>,
        polls_at_execute: Mutex<Vec<usize>>,
    }

    impl ScriptedPool {
        fn new(max: usize, readings: &[usize]) -> Self {
            ScriptedPool {
                readings: Mutex::new(readings.iter().copied().collect()),
                last: Mutex::new(0),
                max,
                polls: Mutex::new(0),
                polls_at_execute: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ClusterSession for ScriptedPool {
        async fn query(&self, _cql: &str) -> Result<ResultSet, SessionError> {
            Ok(ResultSet::default())
        }

        async fn prepare(&self, _cql: &str) -> Result<Arc<PreparedStatement>, SessionError> {
            Err(SessionError::InvalidQuery("unsupported".into()))
        }

        async fn execute(&self, _statement: &BoundStatement) -> Result<(), SessionError> {
            let polls = *self.polls.lock().unwrap();
            self.polls_at_execute.lock().unwrap().push(polls);
            Ok(())
        }

        fn pool_state(&self) -> PoolState {
            *self.polls.lock().unwrap() += 1;
            let mut last = self.last.lock().unwrap();
            if let Some(next) = self.readings.lock().unwrap().pop_front() {
                *last = next;
            }
            PoolState {
                hosts: vec![HostLoad {
                    address: "scripted".into(),
                    in_flight: *last,
                }],
                max_requests_per_connection: self.max,
            }
        }

        async fn close(&self) -> Result<(), SessionError> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    /// Session whose in-flight count rises while a write is running.
    struct LoadedPool {
        max: usize,
        latency: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        writes: AtomicUsize,
    }

    impl LoadedPool {
        fn new(max: usize, latency: Duration) -> Self {
            LoadedPool {
                max,
                latency,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                writes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ClusterSession for LoadedPool {
        async fn query(&self, _cql: &str) -> Result<ResultSet, SessionError> {
            Ok(ResultSet::default())
        }

        async fn prepare(&self, _cql: &str) -> Result<Arc<PreparedStatement>, SessionError> {
            Err(SessionError::InvalidQuery("unsupported".into()))
        }

        async fn execute(&self, _statement: &BoundStatement) -> Result<(), SessionError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn pool_state(&self) -> PoolState {
            PoolState {
                hosts: vec![HostLoad {
                    address: "loaded".into(),
                    in_flight: self.in_flight.load(Ordering::SeqCst),
                }],
                max_requests_per_connection: self.max,
            }
        }

        async fn close(&self) -> Result<(), SessionError> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    async fn run_loaded_batch() -> Arc<LoadedPool> {
        let pool = Arc::new(LoadedPool::new(4, Duration::from_millis(5)));
        let executor = BatchInsertExecutor::new(pool.clone(), Duration::from_millis(1));

        let outcome = executor.execute((0..200).map(|_| statement()).collect()).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.succeeded, 200);
        assert_eq!(executor.outstanding.load(Ordering::SeqCst), 0);
        pool
    }

    fn statement() -> BoundStatement {
        let prepared = Arc::new(PreparedStatement {
            cql: "INSERT INTO ks.t (id) VALUES (?)".into(),
            keyspace: "ks".into(),
            table: "t".into(),
            bind_markers: vec![Column::new("id", DataTypeTag::Int32)],
        });
        prepared.bind(vec![CqlValue::Int32(1)]).unwrap()
    }

    #[tokio::test]
    async fn test_saturated_pool_holds_submission_until_half() {
        // Saturated at the first check, still above half on the next two polls.
        let pool = Arc::new(ScriptedPool::new(8, &[8, 8, 6, 5, 4]));
        let executor = BatchInsertExecutor::new(pool.clone(), Duration::from_millis(1));

        let outcome = executor.execute(vec![statement()]).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(*pool.polls.lock().unwrap(), 5);
        assert_eq!(*pool.polls_at_execute.lock().unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn test_unsaturated_pool_is_not_throttled() {
        let pool = Arc::new(ScriptedPool::new(8, &[7, 3, 0]));
        let executor = BatchInsertExecutor::new(pool.clone(), Duration::from_millis(1));

        let outcome = executor
            .execute(vec![statement(), statement(), statement()])
            .await;

        assert_eq!(outcome.succeeded, 3);
        assert_eq!(*pool.polls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_in_flight_writes_stay_within_pool_limit() {
        let pool = run_loaded_batch().await;
        assert_eq!(pool.writes.load(Ordering::SeqCst), 200);
        assert!(pool.peak.load(Ordering::SeqCst) <= 4, "peak {}", pool.peak.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_in_flight_writes_stay_within_pool_limit_across_workers() {
        let pool = run_loaded_batch().await;
        assert_eq!(pool.writes.load(Ordering::SeqCst), 200);
        assert!(pool.peak.load(Ordering::SeqCst) <= 4, "peak {}", pool.peak.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failures_are_aggregated() {
        let cluster = MemoryCluster::new();
        cluster.create_table("ks", "t", vec![Column::new("id", DataTypeTag::Int32)]);
        cluster.inject_unavailable(2);
        let session = cluster.session("local", None);
        let prepared = session
            .prepare("INSERT INTO ks.t (id) VALUES (?)")
            .await
            .unwrap();
        let statements = (0..5)
            .map(|i| prepared.bind(vec![CqlValue::Int32(i)]).unwrap())
            .collect();

        let executor = BatchInsertExecutor::new(session, Duration::from_millis(1));
        let outcome = executor.execute(statements).await;

        assert_eq!(outcome.submitted, 5);
        assert_eq!(outcome.succeeded, 3);
        assert_eq!(outcome.failed(), 2);
        assert_eq!(cluster.rows("ks", "t").len(), 3);

        match outcome.into_result() {
            Err(MigrationError::Write { failed, total, first_error }) => {
                assert_eq!((failed, total), (2, 5));
                assert!(first_error.contains("Unavailable"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_queue_flushes_at_capacity() {
        let pool = Arc::new(ScriptedPool::new(0, &[]));
        let executor = BatchInsertExecutor::new(pool.clone(), Duration::from_millis(1));
        let mut queue = BatchQueue::new(2);

        assert!(!queue.push(statement()));
        assert!(queue.push(statement()));
        let outcome = executor.flush(&mut queue).await;
        assert_eq!(outcome.succeeded, 2);
        assert!(queue.is_empty());

        let outcome = executor.flush(&mut queue).await;
        assert_eq!(outcome, BatchOutcome::default());
        assert_eq!(pool.polls_at_execute.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let cluster = MemoryCluster::new();
        let executor = BatchInsertExecutor::new(cluster.session("local", None), Duration::from_millis(1));
        let outcome = executor.execute(Vec::new()).await;
        assert_eq!(outcome.submitted, 0);
        assert!(outcome.into_result().is_ok());
    }
}
