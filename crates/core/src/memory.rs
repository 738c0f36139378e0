//! In-memory cluster implementing the client traits.
//!
//! Understands the small CQL surface the migration pipeline issues: full-table scans
//! (optionally with `LIMIT`) and positional `INSERT` statements. The first column of a
//! table acts as its primary key, so re-inserting a key overwrites the row.

use crate::error::SessionError;
use crate::retry::{Consistency, RetryDecision, RetryPolicy, UnavailableInfo, WriteTimeoutInfo, WriteType};
use crate::statement::{BoundStatement, HostLoad, PoolState, PreparedStatement};
use crate::traits::{ClusterConnector, ClusterSession, ConnectOptions};
use crate::types::{Column, CqlValue, DataTypeTag, ResultSet};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, trace};

/// Default ceiling of concurrent requests per connection.
pub const DEFAULT_MAX_REQUESTS_PER_CONNECTION: usize = 2048;

/// Serializable description of one table and its rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableFixture {
    /// Keyspace name
    pub keyspace: String,
    /// Table name
    pub table: String,
    /// Columns in table order
    pub columns: Vec<Column>,
    /// Rows, aligned with `columns`
    #[serde(default)]
    pub rows: Vec<Vec<CqlValue>>,
}

/// Serializable description of one cluster.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterFixture {
    /// Host names the cluster answers on
    pub hosts: Vec<String>,
    /// Tables held by the cluster
    #[serde(default)]
    pub tables: Vec<TableFixture>,
}

/// Serializable description of every cluster a connector can reach.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureFile {
    /// Clusters by host
    pub clusters: Vec<ClusterFixture>,
}

impl FixtureFile {
    /// Load a fixture from a JSON file.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let data = std::fs::read(path)?;
        serde_json::from_slice(&data)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Write the fixture to a JSON file.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let data = serde_json::to_vec_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, data)
    }
}

#[derive(Clone, Debug)]
struct TableData {
    columns: Vec<Column>,
    rows: Vec<Vec<CqlValue>>,
    // Primary key to position in `rows`.
    index: HashMap<CqlValue, usize>,
}

impl TableData {
    fn new(columns: Vec<Column>) -> Self {
        TableData {
            columns,
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn upsert(&mut self, row: Vec<CqlValue>) {
        let key = row.first().cloned().unwrap_or(CqlValue::Null);
        match self.index.get(&key) {
            Some(&pos) => self.rows[pos] = row,
            None => {
                self.index.insert(key, self.rows.len());
                self.rows.push(row);
            }
        }
    }
}

#[derive(Default)]
struct ClusterState {
    tables: HashMap<(String, String), TableData>,
    keyspaces: Vec<String>,
}

struct ClusterInner {
    state: Mutex<ClusterState>,
    max_requests_per_connection: AtomicUsize,
    write_latency_ms: AtomicU32,
    pending_write_timeouts: AtomicU32,
    pending_unavailable: AtomicU32,
    connections_opened: AtomicUsize,
    connections_closed: AtomicUsize,
    write_attempts: AtomicUsize,
}

/// A single in-memory cluster. Cloning shares the underlying data.
#[derive(Clone)]
pub struct MemoryCluster {
    inner: Arc<ClusterInner>,
}

impl MemoryCluster {
    /// Create an empty cluster.
    pub fn new() -> Self {
        MemoryCluster {
            inner: Arc::new(ClusterInner {
                state: Mutex::new(ClusterState::default()),
                max_requests_per_connection: AtomicUsize::new(DEFAULT_MAX_REQUESTS_PER_CONNECTION),
                write_latency_ms: AtomicU32::new(0),
                pending_write_timeouts: AtomicU32::new(0),
                pending_unavailable: AtomicU32::new(0),
                connections_opened: AtomicUsize::new(0),
                connections_closed: AtomicUsize::new(0),
                write_attempts: AtomicUsize::new(0),
            }),
        }
    }

    /// Build a cluster holding the fixture's tables.
    pub fn from_tables(tables: &[TableFixture]) -> Self {
        let cluster = Self::new();
        for table in tables {
            cluster.create_table(&table.keyspace, &table.table, table.columns.clone());
            for row in &table.rows {
                cluster.insert_row(&table.keyspace, &table.table, row.clone());
            }
        }
        cluster
    }

    /// Create (or replace) a table.
    pub fn create_table(&self, keyspace: &str, table: &str, columns: Vec<Column>) {
        let mut state = self.inner.state.lock().unwrap();
        if !state.keyspaces.iter().any(|k| k == keyspace) {
            state.keyspaces.push(keyspace.to_string());
        }
        state.tables.insert(
            (keyspace.to_string(), table.to_string()),
            TableData::new(columns),
        );
    }

    /// Insert a row aligned with the table's column order, bypassing the session layer.
    pub fn insert_row(&self, keyspace: &str, table: &str, row: Vec<CqlValue>) {
        let mut state = self.inner.state.lock().unwrap();
        if let Some(data) = state
            .tables
            .get_mut(&(keyspace.to_string(), table.to_string()))
        {
            data.upsert(row);
        }
    }

    /// Rows currently stored in a table, in insertion order.
    pub fn rows(&self, keyspace: &str, table: &str) -> Vec<Vec<CqlValue>> {
        let state = self.inner.state.lock().unwrap();
        state
            .tables
            .get(&(keyspace.to_string(), table.to_string()))
            .map(|data| data.rows.clone())
            .unwrap_or_default()
    }

    /// Snapshot every table as fixtures, sorted by keyspace then table.
    pub fn tables(&self) -> Vec<TableFixture> {
        let state = self.inner.state.lock().unwrap();
        let mut tables: Vec<TableFixture> = state
            .tables
            .iter()
            .map(|((keyspace, table), data)| TableFixture {
                keyspace: keyspace.clone(),
                table: table.clone(),
                columns: data.columns.clone(),
                rows: data.rows.clone(),
            })
            .collect();
        tables.sort_by(|a, b| (&a.keyspace, &a.table).cmp(&(&b.keyspace, &b.table)));
        tables
    }

    /// Set the per-connection request ceiling reported by sessions.
    pub fn set_max_requests_per_connection(&self, max: usize) {
        self.inner
            .max_requests_per_connection
            .store(max, Ordering::SeqCst);
    }

    /// Delay every write by `latency`.
    pub fn set_write_latency(&self, latency: Duration) {
        let millis = u32::try_from(latency.as_millis()).unwrap_or(u32::MAX);
        self.inner.write_latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Make the next `count` write attempts time out.
    pub fn inject_write_timeouts(&self, count: u32) {
        self.inner
            .pending_write_timeouts
            .store(count, Ordering::SeqCst);
    }

    /// Make the next `count` write attempts fail as unavailable.
    pub fn inject_unavailable(&self, count: u32) {
        self.inner.pending_unavailable.store(count, Ordering::SeqCst);
    }

    /// Number of sessions opened against this cluster.
    pub fn connections_opened(&self) -> usize {
        self.inner.connections_opened.load(Ordering::SeqCst)
    }

    /// Number of sessions closed, each counted once.
    pub fn connections_closed(&self) -> usize {
        self.inner.connections_closed.load(Ordering::SeqCst)
    }

    /// Number of write attempts, retries included.
    pub fn write_attempts(&self) -> usize {
        self.inner.write_attempts.load(Ordering::SeqCst)
    }

    /// Open a session directly, without going through a connector.
    pub fn session(&self, address: &str, retry_policy: Option<Arc<dyn RetryPolicy>>) -> Arc<MemorySession> {
        self.inner.connections_opened.fetch_add(1, Ordering::SeqCst);
        Arc::new(MemorySession {
            cluster: self.clone(),
            address: address.to_string(),
            retry_policy,
            in_flight: Arc::new(AtomicUsize::new(0)),
            closed: AtomicBool::new(false),
        })
    }

    fn take_fault(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter when a request completes or is dropped.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(Arc::clone(counter))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Session against a [`MemoryCluster`].
pub struct MemorySession {
    cluster: MemoryCluster,
    address: String,
    retry_policy: Option<Arc<dyn RetryPolicy>>,
    in_flight: Arc<AtomicUsize>,
    closed: AtomicBool,
}

impl MemorySession {
    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    fn lookup(&self, keyspace: &str, table: &str) -> Result<TableData, SessionError> {
        let state = self.cluster.inner.state.lock().unwrap();
        if !state.keyspaces.iter().any(|k| k == keyspace) {
            return Err(SessionError::KeyspaceNotFound(keyspace.to_string()));
        }
        state
            .tables
            .get(&(keyspace.to_string(), table.to_string()))
            .cloned()
            .ok_or_else(|| SessionError::TableNotFound {
                keyspace: keyspace.to_string(),
                table: table.to_string(),
            })
    }

    /// Run pending injected faults through the retry policy.
    async fn apply_faults(&self) -> Result<(), SessionError> {
        let inner = &self.cluster.inner;
        let mut retry_count = 0;
        loop {
            inner.write_attempts.fetch_add(1, Ordering::SeqCst);

            let (error, decision) = if MemoryCluster::take_fault(&inner.pending_write_timeouts) {
                let info = WriteTimeoutInfo {
                    consistency: Consistency::default(),
                    write_type: WriteType::Simple,
                    required_acks: 2,
                    received_acks: 1,
                    retry_count,
                };
                let decision = self
                    .retry_policy
                    .as_ref()
                    .map(|p| p.on_write_timeout(&info))
                    .unwrap_or(RetryDecision::Rethrow);
                (
                    SessionError::WriteTimeout {
                        required: info.required_acks,
                        received: info.received_acks,
                    },
                    decision,
                )
            } else if MemoryCluster::take_fault(&inner.pending_unavailable) {
                let info = UnavailableInfo {
                    consistency: Consistency::default(),
                    required_replicas: 2,
                    alive_replicas: 1,
                    retry_count,
                };
                let decision = self
                    .retry_policy
                    .as_ref()
                    .map(|p| p.on_unavailable(&info))
                    .unwrap_or(RetryDecision::Rethrow);
                (
                    SessionError::Unavailable {
                        required: info.required_replicas,
                        alive: info.alive_replicas,
                    },
                    decision,
                )
            } else {
                return Ok(());
            };

            match decision {
                RetryDecision::Retry { delay, .. } => {
                    trace!(retry_count, "retrying write after {:?}", delay);
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                RetryDecision::Ignore => return Ok(()),
                RetryDecision::Rethrow => return Err(error),
            }
        }
    }
}

#[async_trait]
impl ClusterSession for MemorySession {
    async fn query(&self, cql: &str) -> Result<ResultSet, SessionError> {
        self.ensure_open()?;
        let select = parse_select(cql)?;
        let data = self.lookup(&select.keyspace, &select.table)?;

        let mut rows = data.rows;
        if let Some(limit) = select.limit {
            rows.truncate(limit);
        }
        debug!(keyspace = %select.keyspace, table = %select.table, rows = rows.len(), "query served");

        Ok(ResultSet {
            columns: data.columns,
            rows,
        })
    }

    async fn prepare(&self, cql: &str) -> Result<Arc<PreparedStatement>, SessionError> {
        self.ensure_open()?;
        let insert = parse_insert(cql)?;
        let data = self.lookup(&insert.keyspace, &insert.table)?;

        if insert.columns.len() != insert.placeholders {
            return Err(SessionError::InvalidQuery(format!(
                "{} columns but {} bind markers",
                insert.columns.len(),
                insert.placeholders
            )));
        }

        let bind_markers = insert
            .columns
            .iter()
            .map(|name| {
                data.columns
                    .iter()
                    .find(|c| &c.name == name)
                    .cloned()
                    .ok_or_else(|| {
                        SessionError::InvalidQuery(format!("Undefined column name {}", name))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Arc::new(PreparedStatement {
            cql: cql.to_string(),
            keyspace: insert.keyspace,
            table: insert.table,
            bind_markers,
        }))
    }

    async fn execute(&self, statement: &BoundStatement) -> Result<(), SessionError> {
        self.ensure_open()?;
        let _guard = InFlightGuard::enter(&self.in_flight);
        let prepared = &statement.prepared;

        if statement.values.len() != prepared.placeholder_count() {
            return Err(SessionError::BindArity {
                expected: prepared.placeholder_count(),
                actual: statement.values.len(),
            });
        }
        for (column, value) in prepared.bind_markers.iter().zip(&statement.values) {
            if !value.fits(column.data_type) {
                return Err(SessionError::InvalidValue {
                    column: column.name.clone(),
                    message: format!("{:?} is not a valid {}", value, column.data_type),
                });
            }
        }

        let latency = self.cluster.inner.write_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(u64::from(latency))).await;
        }

        self.apply_faults().await?;

        let mut state = self.cluster.inner.state.lock().unwrap();
        let data = state
            .tables
            .get_mut(&(prepared.keyspace.clone(), prepared.table.clone()))
            .ok_or_else(|| SessionError::TableNotFound {
                keyspace: prepared.keyspace.clone(),
                table: prepared.table.clone(),
            })?;

        let mut row = vec![CqlValue::Null; data.columns.len()];
        for (marker, value) in prepared.bind_markers.iter().zip(&statement.values) {
            if let Some(idx) = data.columns.iter().position(|c| c.name == marker.name) {
                row[idx] = normalize(value.clone(), marker.data_type)?;
            }
        }
        data.upsert(row);
        Ok(())
    }

    fn pool_state(&self) -> PoolState {
        PoolState {
            hosts: vec![HostLoad {
                address: self.address.clone(),
                in_flight: self.in_flight.load(Ordering::SeqCst),
            }],
            max_requests_per_connection: self
                .cluster
                .inner
                .max_requests_per_connection
                .load(Ordering::SeqCst),
        }
    }

    async fn close(&self) -> Result<(), SessionError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.cluster
                .inner
                .connections_closed
                .fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Store epoch milliseconds bound to timestamp columns as instants.
fn normalize(value: CqlValue, data_type: DataTypeTag) -> Result<CqlValue, SessionError> {
    match (value, data_type) {
        (CqlValue::Int64(millis), DataTypeTag::Timestamp) => Utc
            .timestamp_millis_opt(millis)
            .single()
            .map(CqlValue::Timestamp)
            .ok_or_else(|| SessionError::InvalidValue {
                column: "timestamp".to_string(),
                message: format!("{} is out of range", millis),
            }),
        (value, _) => Ok(value),
    }
}

/// Connector routing contact points to in-memory clusters by host name.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    clusters: Arc<Mutex<Vec<(Vec<String>, MemoryCluster)>>>,
}

impl MemoryConnector {
    /// Create a connector with no clusters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a connector from a fixture file's contents.
    pub fn from_fixture(fixture: &FixtureFile) -> Self {
        let connector = Self::new();
        for cluster in &fixture.clusters {
            connector.register(cluster.hosts.clone(), MemoryCluster::from_tables(&cluster.tables));
        }
        connector
    }

    /// Make `cluster` reachable through any of `hosts`.
    pub fn register(&self, hosts: Vec<String>, cluster: MemoryCluster) {
        self.clusters.lock().unwrap().push((hosts, cluster));
    }

    /// Snapshot every registered cluster.
    pub fn to_fixture(&self) -> FixtureFile {
        let clusters = self.clusters.lock().unwrap();
        FixtureFile {
            clusters: clusters
                .iter()
                .map(|(hosts, cluster)| ClusterFixture {
                    hosts: hosts.clone(),
                    tables: cluster.tables(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ClusterConnector for MemoryConnector {
    async fn connect(&self, options: ConnectOptions) -> Result<Arc<dyn ClusterSession>, SessionError> {
        let clusters = self.clusters.lock().unwrap();
        let (host, cluster) = options
            .endpoint
            .endpoints
            .iter()
            .find_map(|host| {
                clusters
                    .iter()
                    .find(|(hosts, _)| hosts.contains(host))
                    .map(|(_, cluster)| (host.clone(), cluster.clone()))
            })
            .ok_or_else(|| {
                SessionError::Connection(format!(
                    "no host reachable among {:?}",
                    options.endpoint.contact_points()
                ))
            })?;

        let address = format!("{}:{}", host, options.endpoint.port);
        let session: Arc<dyn ClusterSession> = cluster.session(&address, options.retry_policy);
        Ok(session)
    }
}

struct SelectQuery {
    keyspace: String,
    table: String,
    limit: Option<usize>,
}

struct InsertQuery {
    keyspace: String,
    table: String,
    columns: Vec<String>,
    placeholders: usize,
}

fn split_qualified(name: &str, cql: &str) -> Result<(String, String), SessionError> {
    match name.split_once('.') {
        Some((keyspace, table)) if !keyspace.is_empty() && !table.is_empty() => {
            Ok((keyspace.to_string(), table.to_string()))
        }
        _ => Err(SessionError::InvalidQuery(format!(
            "expected keyspace.table in: {}",
            cql
        ))),
    }
}

fn parse_select(cql: &str) -> Result<SelectQuery, SessionError> {
    let tokens: Vec<&str> = cql.trim().trim_end_matches(';').split_whitespace().collect();
    let invalid = || SessionError::InvalidQuery(cql.to_string());

    if tokens.len() < 4
        || !tokens[0].eq_ignore_ascii_case("select")
        || tokens[1] != "*"
        || !tokens[2].eq_ignore_ascii_case("from")
    {
        return Err(invalid());
    }
    let (keyspace, table) = split_qualified(tokens[3], cql)?;

    let limit = match &tokens[4..] {
        [] => None,
        [kw, n] if kw.eq_ignore_ascii_case("limit") => Some(n.parse().map_err(|_| invalid())?),
        _ => return Err(invalid()),
    };

    Ok(SelectQuery {
        keyspace,
        table,
        limit,
    })
}

fn parse_insert(cql: &str) -> Result<InsertQuery, SessionError> {
    let invalid = || SessionError::InvalidQuery(cql.to_string());
    let text = cql.trim().trim_end_matches(';');

    let rest = text
        .get(..12)
        .filter(|head| head.eq_ignore_ascii_case("insert into "))
        .map(|_| &text[12..])
        .ok_or_else(invalid)?;

    let open = rest.find('(').ok_or_else(invalid)?;
    let close = rest.find(')').ok_or_else(invalid)?;
    let (keyspace, table) = split_qualified(rest[..open].trim(), cql)?;
    let columns: Vec<String> = rest[open + 1..close]
        .split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    let values = rest[close + 1..].trim();
    let values_open = values.find('(').ok_or_else(invalid)?;
    if !values[..values_open].trim().eq_ignore_ascii_case("values") {
        return Err(invalid());
    }
    let placeholders = values[values_open..]
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .filter(|p| p.trim() == "?")
        .count();

    Ok(InsertQuery {
        keyspace,
        table,
        columns,
        placeholders,
    })
}
