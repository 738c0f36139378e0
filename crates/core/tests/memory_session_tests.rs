//! Integration tests for the in-memory cluster through the client traits.

use colmigrate_core::{
    ClusterConnector, ClusterEndpoint, ClusterSession, Column, ConnectOptions, CqlValue,
    DataTypeTag, MemoryCluster, MemoryConnector, ReadTimeoutInfo, RetryDecision, RetryPolicy,
    UnavailableInfo, WriteTimeoutInfo,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Retries write timeouts immediately and counts how often it was asked.
#[derive(Default)]
struct CountingPolicy {
    write_timeouts: AtomicU32,
}

impl RetryPolicy for CountingPolicy {
    fn on_write_timeout(&self, info: &WriteTimeoutInfo) -> RetryDecision {
        self.write_timeouts.fetch_add(1, Ordering::SeqCst);
        RetryDecision::Retry {
            consistency: info.consistency,
            delay: Duration::from_millis(1),
        }
    }

    fn on_read_timeout(&self, _info: &ReadTimeoutInfo) -> RetryDecision {
        RetryDecision::Rethrow
    }

    fn on_unavailable(&self, _info: &UnavailableInfo) -> RetryDecision {
        RetryDecision::Ignore
    }
}

fn events_cluster() -> MemoryCluster {
    let cluster = MemoryCluster::new();
    cluster.create_table(
        "metrics",
        "events",
        vec![
            Column::new("id", DataTypeTag::Long),
            Column::new("at", DataTypeTag::Timestamp),
        ],
    );
    cluster
}

async fn connect(
    cluster: &MemoryCluster,
    policy: Option<Arc<dyn RetryPolicy>>,
) -> Arc<dyn ClusterSession> {
    let connector = MemoryConnector::new();
    connector.register(vec!["node-a".into()], cluster.clone());
    let mut options = ConnectOptions::new(ClusterEndpoint {
        endpoints: vec!["node-a".into()],
        port: 9042,
    });
    if let Some(policy) = policy {
        options = options.with_retry_policy(policy);
    }
    connector.connect(options).await.unwrap()
}

#[tokio::test]
async fn test_policy_is_consulted_for_each_write_timeout() {
    let cluster = events_cluster();
    cluster.inject_write_timeouts(3);
    let policy = Arc::new(CountingPolicy::default());
    let session = connect(&cluster, Some(policy.clone() as Arc<dyn RetryPolicy>)).await;

    let prepared = session
        .prepare("INSERT INTO metrics.events (id,at) VALUES (?,?)")
        .await
        .unwrap();
    let bound = prepared
        .bind(vec![CqlValue::Int64(1), CqlValue::Int64(1_700_000_000_000)])
        .unwrap();
    session.execute(&bound).await.unwrap();

    assert_eq!(policy.write_timeouts.load(Ordering::SeqCst), 3);
    assert_eq!(cluster.write_attempts(), 4);

    // Epoch milliseconds bound to a timestamp column are stored as instants.
    let rows = cluster.rows("metrics", "events");
    assert!(matches!(rows[0][1], CqlValue::Timestamp(t) if t.timestamp_millis() == 1_700_000_000_000));
}

#[tokio::test]
async fn test_ignored_unavailable_reports_success() {
    let cluster = events_cluster();
    cluster.inject_unavailable(1);
    let policy: Arc<dyn RetryPolicy> = Arc::new(CountingPolicy::default());
    let session = connect(&cluster, Some(policy)).await;

    let prepared = session
        .prepare("INSERT INTO metrics.events (id,at) VALUES (?,?)")
        .await
        .unwrap();
    session
        .execute(&prepared.bind(vec![CqlValue::Int64(1), CqlValue::Null]).unwrap())
        .await
        .unwrap();

    assert_eq!(cluster.rows("metrics", "events").len(), 1);
}

#[tokio::test]
async fn test_pool_reports_pending_writes() {
    let cluster = events_cluster();
    cluster.set_max_requests_per_connection(4);
    cluster.set_write_latency(Duration::from_millis(50));
    let session = connect(&cluster, None).await;

    let prepared = session
        .prepare("INSERT INTO metrics.events (id,at) VALUES (?,?)")
        .await
        .unwrap();
    let mut tasks = tokio::task::JoinSet::new();
    for id in 0..3 {
        let session = Arc::clone(&session);
        let bound = prepared.bind(vec![CqlValue::Int64(id), CqlValue::Null]).unwrap();
        tasks.spawn(async move { session.execute(&bound).await });
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    let state = session.pool_state();
    assert_eq!(state.max_requests_per_connection, 4);
    assert_eq!(state.total_in_flight(), 3);

    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }
    assert_eq!(session.pool_state().total_in_flight(), 0);
    assert_eq!(cluster.rows("metrics", "events").len(), 3);
}
