//! Loading a delimited file into a target table.

use crate::catalog::get_columns;
use crate::codec::RecordReader;
use crate::coercion::coerce;
use crate::config::{ConnectionSettings, DataFileSettings, MigrationSettings};
use crate::error::{MigrationError, MigrationResult};
use crate::executor::{BatchInsertExecutor, BatchQueue};
use crate::progress::TransferProgress;
use crate::stats::TransferStats;
use colmigrate_core::{Column, ClusterSession, CqlValue, PreparedStatement, SessionError};
use colmigrate_observability as obs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Parameterized insert covering every column of a table, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertTemplate {
    /// Target keyspace
    pub keyspace: String,
    /// Target table
    pub table: String,
    /// Column names, in bind order
    pub column_names: Vec<String>,
    /// Number of `?` markers
    pub placeholder_count: usize,
}

impl InsertTemplate {
    /// Build the template for `columns`.
    pub fn new(keyspace: &str, table: &str, columns: &[Column]) -> Self {
        InsertTemplate {
            keyspace: keyspace.to_string(),
            table: table.to_string(),
            column_names: columns.iter().map(|c| c.name.clone()).collect(),
            placeholder_count: columns.len(),
        }
    }

    /// Statement text.
    pub fn cql(&self) -> String {
        let markers = vec!["?"; self.placeholder_count].join(",");
        format!(
            "INSERT INTO {}.{} ({}) VALUES ({})",
            self.keyspace,
            self.table,
            self.column_names.join(","),
            markers
        )
    }

    /// Prepare the statement on `session`.
    pub async fn prepare(
        &self,
        session: &dyn ClusterSession,
    ) -> MigrationResult<Arc<PreparedStatement>> {
        let cql = self.cql();
        debug!(%cql, "preparing insert statement");
        let prepared = session.prepare(&cql).await?;
        if prepared.placeholder_count() != self.placeholder_count {
            return Err(SessionError::BindArity {
                expected: self.placeholder_count,
                actual: prepared.placeholder_count(),
            }
            .into());
        }
        Ok(prepared)
    }
}

/// Settings shared by file insertion and direct transfer.
#[derive(Debug, Clone)]
pub struct InsertConfig {
    /// Target keyspace
    pub keyspace: String,
    /// Target table
    pub table: String,
    /// Statements per executed batch
    pub batch_size: usize,
    /// Pool poll interval while throttled
    pub poll_interval: Duration,
    /// Draw a progress bar
    pub show_progress: bool,
}

impl InsertConfig {
    /// Take batch and progress settings from `settings`, naming `target` as the table.
    pub fn from_settings(settings: &MigrationSettings, target: &ConnectionSettings) -> Self {
        InsertConfig {
            keyspace: target.keyspace.clone(),
            table: target.table.clone(),
            batch_size: settings.batch_size(),
            poll_interval: settings.backpressure_poll(),
            show_progress: settings.show_progress,
        }
    }
}

/// Coerce one record's tokens into values for `columns`, positionally.
pub fn prepare_row(columns: &[Column], tokens: &[String]) -> MigrationResult<Vec<CqlValue>> {
    if tokens.len() != columns.len() {
        return Err(SessionError::BindArity {
            expected: columns.len(),
            actual: tokens.len(),
        }
        .into());
    }
    columns
        .iter()
        .zip(tokens)
        .map(|(column, token)| coerce(token, column.data_type))
        .collect()
}

fn ensure_readable(path: &Path) -> MigrationResult<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(MigrationError::FileAccess {
            path: path.to_path_buf(),
            reason: "the file either does not exist or cannot be read; check the path provided"
                .to_string(),
        }),
    }
}

/// Inserts the records of a delimited file into a target table.
pub struct FileInserter {
    session: Arc<dyn ClusterSession>,
    config: InsertConfig,
    stats: TransferStats,
}

impl FileInserter {
    /// Create an inserter writing through `session`.
    pub fn new(session: Arc<dyn ClusterSession>, config: InsertConfig) -> Self {
        FileInserter {
            session,
            config,
            stats: TransferStats::default(),
        }
    }

    /// Perform the insertion.
    ///
    /// Records bind positionally in the target's catalog order. A record that fails to
    /// coerce aborts the run; batches already joined stay written.
    pub async fn insert(&mut self, file: &DataFileSettings) -> MigrationResult<TransferStats> {
        info!("Starting insertion phase...");
        let started = Instant::now();

        ensure_readable(&file.path)?;
        let delimiter = file.delimiter()?;

        let columns = get_columns(self.session.as_ref(), &self.config.keyspace, &self.config.table).await?;
        let prepared = InsertTemplate::new(&self.config.keyspace, &self.config.table, &columns)
            .prepare(self.session.as_ref())
            .await?;

        info!("Reading data from file...");
        let reader = RecordReader::open(&file.path, delimiter, file.has_header, Some(columns.len()))?;
        if let Some(header) = reader.header() {
            if !header.iter().eq(columns.iter().map(|c| &c.name)) {
                warn!(
                    ?header,
                    "file header differs from target column order; binding by position"
                );
            }
        }

        let progress = TransferProgress::new(None, self.config.show_progress);
        let result = self.process_records(reader, &columns, &prepared, &progress).await;
        match &result {
            Ok(()) => {
                progress.finish();
            }
            Err(e) => progress.abandon(format!("Insertion aborted: {}", e)),
        }
        result?;

        self.stats.elapsed = started.elapsed();
        obs::record_phase_elapsed("insertion", self.stats.elapsed);
        info!("{}", self.stats.summary());
        Ok(self.stats.clone())
    }

    async fn process_records<R: std::io::Read>(
        &mut self,
        reader: RecordReader<R>,
        columns: &[Column],
        prepared: &Arc<PreparedStatement>,
        progress: &TransferProgress,
    ) -> MigrationResult<()> {
        info!("Processing records...");
        let executor = BatchInsertExecutor::new(Arc::clone(&self.session), self.config.poll_interval);
        let mut queue = BatchQueue::new(self.config.batch_size);

        for (index, record) in reader.enumerate() {
            let values = record.and_then(|tokens| prepare_row(columns, &tokens)).map_err(|e| {
                error!(record = index + 1, "Rejected record: {}", e);
                e
            })?;
            self.stats.rows_read += 1;
            if queue.push(prepared.bind(values)?) {
                self.flush(&executor, &mut queue, progress).await?;
            }
        }
        self.flush(&executor, &mut queue, progress).await
    }

    async fn flush(
        &mut self,
        executor: &BatchInsertExecutor,
        queue: &mut BatchQueue,
        progress: &TransferProgress,
    ) -> MigrationResult<()> {
        if queue.is_empty() {
            return Ok(());
        }
        let outcome = executor.flush(queue).await;
        self.stats.absorb(&outcome);
        progress.inc(outcome.succeeded);
        outcome.into_result().map(|_| ())
    }

    /// Statistics gathered so far.
    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colmigrate_core::{DataTypeTag, MemoryCluster};
    use std::io::Write;

    fn columns() -> Vec<Column> {
        vec![
            Column::new("id", DataTypeTag::Int32),
            Column::new("name", DataTypeTag::Text),
            Column::new("active", DataTypeTag::Boolean),
        ]
    }

    fn config(batch_size: usize) -> InsertConfig {
        InsertConfig {
            keyspace: "ks".into(),
            table: "people".into(),
            batch_size,
            poll_interval: Duration::from_millis(1),
            show_progress: false,
        }
    }

    fn write_file(dir: &Path, content: &str) -> DataFileSettings {
        let path = dir.join("people.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        DataFileSettings {
            path,
            has_header: false,
            delimiter: ",".into(),
        }
    }

    #[test]
    fn test_template_lists_columns_in_order() {
        let template = InsertTemplate::new("ks", "people", &columns());
        assert_eq!(template.placeholder_count, 3);
        assert_eq!(
            template.cql(),
            "INSERT INTO ks.people (id,name,active) VALUES (?,?,?)"
        );
    }

    #[test]
    fn test_prepare_row_checks_arity() {
        let tokens = vec!["1".to_string(), "a".to_string()];
        let err = prepare_row(&columns(), &tokens).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::Session(SessionError::BindArity { expected: 3, actual: 2 })
        ));
    }

    #[tokio::test]
    async fn test_insert_in_batches() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(
            dir.path(),
            "1,\"Smith, Ann\",true\n2,Bob,FALSE\n3,,true\n4,\"Dee \"\"D\"\"\"\n5,Eve,false\n",
        );
        let cluster = MemoryCluster::new();
        cluster.create_table("ks", "people", columns());

        let mut inserter = FileInserter::new(cluster.session("local", None), config(2));
        let err = inserter.insert(&file).await.unwrap_err();

        // Row 4 is missing its boolean, which pads to "" and fails to coerce.
        assert!(matches!(err, MigrationError::Coercion { .. }));
        assert_eq!(inserter.stats().batches, 1);
        assert_eq!(cluster.rows("ks", "people").len(), 2);
    }

    #[tokio::test]
    async fn test_insert_all_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = write_file(
            dir.path(),
            "id;name;active\n1;\"Smith; Ann\";true\n2;Bob;FALSE\n3;;true\n",
        );
        file.has_header = true;
        file.delimiter = ";".into();
        let cluster = MemoryCluster::new();
        cluster.create_table("ks", "people", columns());

        let mut inserter = FileInserter::new(cluster.session("local", None), config(2));
        let stats = inserter.insert(&file).await.unwrap();

        assert_eq!(stats.rows_read, 3);
        assert_eq!(stats.rows_written, 3);
        assert_eq!(stats.batches, 2);
        let rows = cluster.rows("ks", "people");
        assert_eq!(
            rows[0],
            vec![
                CqlValue::Int32(1),
                CqlValue::Text("Smith; Ann".into()),
                CqlValue::Bool(true)
            ]
        );
        assert_eq!(rows[2][1], CqlValue::Text(String::new()));
    }

    #[tokio::test]
    async fn test_missing_file_is_checked_before_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let file = DataFileSettings {
            path: dir.path().join("absent.csv"),
            has_header: false,
            delimiter: String::new(),
        };
        let cluster = MemoryCluster::new();

        let mut inserter = FileInserter::new(cluster.session("local", None), config(10));
        let err = inserter.insert(&file).await.unwrap_err();
        assert!(matches!(err, MigrationError::FileAccess { .. }));
    }
}
