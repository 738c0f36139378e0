//! Direct cluster-to-cluster row transfer.

use crate::error::{MigrationError, MigrationResult};
use crate::executor::{BatchInsertExecutor, BatchQueue};
use crate::insertion::{InsertConfig, InsertTemplate};
use crate::progress::TransferProgress;
use crate::stats::TransferStats;
use colmigrate_core::{ClusterSession, Column, CqlValue, ResultSet};
use colmigrate_observability as obs;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// For each target column, the index of the same-named source column.
pub fn column_mapping(source: &[Column], target: &[Column]) -> MigrationResult<Vec<usize>> {
    target
        .iter()
        .map(|t| {
            source.iter().position(|s| s.name == t.name).ok_or_else(|| {
                MigrationError::Compliance(format!(
                    "target column {} has no counterpart in the source rows",
                    t.name
                ))
            })
        })
        .collect()
}

/// Writes rows read from a source table into the target table.
pub struct RowTransfer {
    session: Arc<dyn ClusterSession>,
    config: InsertConfig,
}

impl RowTransfer {
    /// Create a transfer writing through the target `session`.
    pub fn new(session: Arc<dyn ClusterSession>, config: InsertConfig) -> Self {
        RowTransfer { session, config }
    }

    /// Insert every row of `rows`, reordered to `target_columns`.
    pub async fn transfer(
        &self,
        rows: ResultSet,
        target_columns: &[Column],
    ) -> MigrationResult<TransferStats> {
        let started = Instant::now();
        let mapping = column_mapping(&rows.columns, target_columns)?;
        let prepared = InsertTemplate::new(&self.config.keyspace, &self.config.table, target_columns)
            .prepare(self.session.as_ref())
            .await?;

        let executor = BatchInsertExecutor::new(Arc::clone(&self.session), self.config.poll_interval);
        let mut queue = BatchQueue::new(self.config.batch_size);
        let progress = TransferProgress::new(Some(rows.len() as u64), self.config.show_progress);
        let mut stats = TransferStats::default();

        info!("Processing rows...");
        for row in rows.rows {
            let values = mapping
                .iter()
                .map(|&i| row.get(i).cloned().unwrap_or(CqlValue::Null))
                .collect();
            stats.rows_read += 1;
            if queue.push(prepared.bind(values)?) {
                let outcome = executor.flush(&mut queue).await;
                stats.absorb(&outcome);
                progress.inc(outcome.succeeded);
                if let Err(e) = outcome.into_result() {
                    progress.abandon(format!("Transfer aborted: {}", e));
                    return Err(e);
                }
            }
        }
        if !queue.is_empty() {
            let outcome = executor.flush(&mut queue).await;
            stats.absorb(&outcome);
            progress.inc(outcome.succeeded);
            if let Err(e) = outcome.into_result() {
                progress.abandon(format!("Transfer aborted: {}", e));
                return Err(e);
            }
        }
        progress.finish();

        stats.elapsed = started.elapsed();
        obs::record_phase_elapsed("transfer", stats.elapsed);
        info!("{}", stats.summary());
        Ok(stats)
    }
}
