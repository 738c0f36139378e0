//! Column metadata lookup.

use crate::error::{MigrationError, MigrationResult};
use colmigrate_core::{ClusterSession, Column};
use tracing::info;

/// Probe query used to discover a table's shape.
pub fn probe_query(keyspace: &str, table: &str) -> String {
    format!("SELECT * FROM {}.{} LIMIT 1", keyspace, table)
}

/// Reads the ordered column list of a table.
///
/// Issues a single-row probe and keeps only the result's column metadata. Nothing is
/// cached; callers fetch once per phase and hold on to the result.
pub async fn get_columns(
    session: &dyn ClusterSession,
    keyspace: &str,
    table: &str,
) -> MigrationResult<Vec<Column>> {
    info!("Getting columns info: [table] {} [keyspace] {}", table, keyspace);

    let result = session
        .query(&probe_query(keyspace, table))
        .await
        .map_err(|e| MigrationError::schema_lookup(keyspace, table, e))?;

    Ok(result.columns)
}
