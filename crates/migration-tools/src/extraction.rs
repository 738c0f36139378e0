//! Dumping a source table into a delimited file.

use crate::codec::{encode_header, encode_row, fields_from_row};
use crate::config::DataFileSettings;
use crate::error::{MigrationError, MigrationResult};
use crate::stats::ExtractionStats;
use colmigrate_core::{ClusterSession, ResultSet};
use colmigrate_observability as obs;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Full-scan query for a table.
pub fn scan_query(keyspace: &str, table: &str) -> String {
    format!("SELECT * FROM {}.{}", keyspace, table)
}

/// Read every row of `keyspace.table`.
pub async fn read_table(
    session: &dyn ClusterSession,
    keyspace: &str,
    table: &str,
) -> MigrationResult<ResultSet> {
    info!("Retrieving rows from table: [table] {} .. [keyspace] {}", table, keyspace);
    let started = Instant::now();
    let rows = session
        .query(&scan_query(keyspace, table))
        .await
        .map_err(|e| {
            if e.is_schema_missing() {
                MigrationError::schema_lookup(keyspace, table, e)
            } else {
                e.into()
            }
        })?;
    obs::record_phase_elapsed("retrieve_rows", started.elapsed());
    debug!(rows = rows.len(), columns = rows.columns.len(), "rows retrieved");
    Ok(rows)
}

fn create_output(path: &Path) -> MigrationResult<BufWriter<File>> {
    let access = |e: std::io::Error| MigrationError::FileAccess {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(access)?;
    }
    File::create(path).map(BufWriter::new).map_err(access)
}

/// Write a result set to `file`, one line per row.
pub fn write_rows(rows: ResultSet, file: &DataFileSettings) -> MigrationResult<ExtractionStats> {
    let delimiter = file.delimiter()?;
    let mut out = create_output(&file.path)?;

    if file.has_header {
        writeln!(out, "{}", encode_header(&rows.columns, delimiter))?;
    }

    let mut stats = ExtractionStats {
        columns: rows.columns.len(),
        path: file.path.clone(),
        ..Default::default()
    };
    for row in rows.rows {
        let fields = fields_from_row(row, &rows.columns);
        writeln!(out, "{}", encode_row(&fields, delimiter))?;
        stats.rows_written += 1;
    }
    out.flush()?;
    Ok(stats)
}

/// Extract `keyspace.table` into the configured extraction file.
pub async fn extract_to_file(
    session: &dyn ClusterSession,
    keyspace: &str,
    table: &str,
    file: &DataFileSettings,
) -> MigrationResult<ExtractionStats> {
    info!("Starting extraction...");
    let started = Instant::now();

    let rows = read_table(session, keyspace, table).await?;
    let mut stats = write_rows(rows, file)?;

    stats.elapsed = started.elapsed();
    obs::record_phase_elapsed("extraction", stats.elapsed);
    info!("{}", stats.summary());
    Ok(stats)
}
