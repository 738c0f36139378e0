//! Sequencing of migration modes and ownership of cluster sessions.
//!
//! A run moves `Idle -> {Extracting, Inserting, CheckingCompliance} -> Done`. Each
//! phase runs inside one guarded region: the first error aborts the run, is logged with
//! recovery steps, and the sessions are disposed no matter how the run ended.

use crate::catalog::get_columns;
use crate::compliance::{self, ComplianceReport};
use crate::config::{MigrationMode, MigrationSettings};
use crate::end_to_end::RowTransfer;
use crate::error::MigrationResult;
use crate::error_handler::PhaseFailure;
use crate::extraction::{extract_to_file, read_table};
use crate::insertion::{FileInserter, InsertConfig};
use crate::retry::WriteTimeoutRetryPolicy;
use crate::session_handle::{SessionHandle, Side};
use crate::stats::{ExtractionStats, RunStats, TransferStats};
use colmigrate_core::{ClusterConnector, Column, RetryPolicy};
use colmigrate_observability as obs;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// Where a run currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    /// Nothing started yet
    Idle,
    /// Reading rows from the source
    Extracting,
    /// Writing rows to the target
    Inserting,
    /// Comparing source and target catalogs
    CheckingCompliance,
    /// Finished, successfully or not
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Extracting => "extracting",
            RunState::Inserting => "inserting",
            RunState::CheckingCompliance => "checking compliance",
            RunState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Outcome of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Identifier carried by every log line of the run
    pub run_id: Uuid,
    /// Mode that was run
    pub mode: MigrationMode,
    /// Final state
    pub state: RunState,
    /// Per-phase statistics
    pub stats: RunStats,
    /// Compliance verdict, for end-to-end runs that got that far
    pub compliance: Option<ComplianceReport>,
    /// Phase that failed, if any
    pub failed_phase: Option<RunState>,
    /// Failure description, if any
    pub failure: Option<String>,
    /// Suggested recovery steps for the failure
    pub recovery_steps: Vec<String>,
    /// Wall time of the run
    pub elapsed: Duration,
}

impl RunReport {
    fn new(run_id: Uuid, mode: MigrationMode) -> Self {
        RunReport {
            run_id,
            mode,
            state: RunState::Idle,
            stats: RunStats::default(),
            compliance: None,
            failed_phase: None,
            failure: None,
            recovery_steps: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Whether every phase completed.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Drives a migration run against a source and a target cluster.
pub struct MigrationOrchestrator {
    settings: MigrationSettings,
    source: SessionHandle,
    target: SessionHandle,
    state: RunState,
}

impl MigrationOrchestrator {
    /// Create an orchestrator. Sessions are opened lazily, and only the target session
    /// carries the write retry policy.
    pub fn new(settings: MigrationSettings, connector: Arc<dyn ClusterConnector>) -> Self {
        let policy: Arc<dyn RetryPolicy> =
            Arc::new(WriteTimeoutRetryPolicy::from_settings(&settings.retry));
        let source = SessionHandle::new(
            Side::Source,
            Arc::clone(&connector),
            settings.connections.source.clone(),
        );
        let target = SessionHandle::new(Side::Target, connector, settings.connections.target.clone())
            .with_retry_policy(policy);

        MigrationOrchestrator {
            settings,
            source,
            target,
            state: RunState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Settings the orchestrator was built with.
    pub fn settings(&self) -> &MigrationSettings {
        &self.settings
    }

    fn enter(&mut self, state: RunState) {
        debug!(from = %self.state, to = %state, "state transition");
        self.state = state;
    }

    /// Run `mode` to completion. Failures are reported in the returned [`RunReport`].
    pub async fn run(&mut self, mode: MigrationMode) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("migration_run", %run_id, %mode);
        self.run_inner(run_id, mode).instrument(span).await
    }

    async fn run_inner(&mut self, run_id: Uuid, mode: MigrationMode) -> RunReport {
        let started = Instant::now();
        self.state = RunState::Idle;
        info!("Starting {} migration...", mode);

        let mut report = RunReport::new(run_id, mode);
        if let Err(failure) = self.execute_mode(mode, &mut report).await {
            failure.log();
            report.failed_phase = Some(failure.phase);
            report.recovery_steps = failure.recovery_steps();
            report.failure = Some(failure.error.to_string());
        }

        self.teardown().await;
        self.enter(RunState::Done);
        report.state = RunState::Done;
        report.elapsed = started.elapsed();
        obs::record_phase_elapsed(&mode.to_string(), report.elapsed);

        if report.is_success() {
            info!("Migration ({}) completed", mode);
        }
        report
    }

    async fn execute_mode(
        &mut self,
        mode: MigrationMode,
        report: &mut RunReport,
    ) -> Result<(), PhaseFailure> {
        self.settings
            .validate_for(mode)
            .map_err(|e| PhaseFailure::new(RunState::Idle, e))?;

        match mode {
            MigrationMode::Extract => {
                self.enter(RunState::Extracting);
                let stats = self
                    .extract()
                    .await
                    .map_err(|e| PhaseFailure::new(RunState::Extracting, e))?;
                report.stats.extraction = Some(stats);
            }
            MigrationMode::Insert => {
                self.enter(RunState::Inserting);
                let stats = self
                    .insert()
                    .await
                    .map_err(|e| PhaseFailure::new(RunState::Inserting, e))?;
                report.stats.insertion = Some(stats);
            }
            MigrationMode::EndToEnd => {
                self.enter(RunState::CheckingCompliance);
                let (verdict, target_columns) = self
                    .compliance_gate()
                    .await
                    .map_err(|e| PhaseFailure::new(RunState::CheckingCompliance, e))?;
                report.compliance = Some(verdict.clone());
                verdict
                    .into_result()
                    .map_err(|e| PhaseFailure::new(RunState::CheckingCompliance, e))?;

                let stats = self.transfer(&target_columns).await?;
                report.stats.insertion = Some(stats);
            }
        }
        Ok(())
    }

    async fn extract(&self) -> MigrationResult<ExtractionStats> {
        let source = self.source.settings()?;
        let file = self.settings.extraction_file()?;
        let session = self.source.session().await?;
        extract_to_file(session.as_ref(), &source.keyspace, &source.table, file).await
    }

    async fn insert(&self) -> MigrationResult<TransferStats> {
        let config = InsertConfig::from_settings(&self.settings, self.target.settings()?);
        let file = self.settings.insertion_file()?;
        let session = self.target.session().await?;
        FileInserter::new(session, config).insert(file).await
    }

    /// Look up both catalogs and compare them.
    async fn compliance_gate(&self) -> MigrationResult<(ComplianceReport, Vec<Column>)> {
        let source = self.source.settings()?;
        let target = self.target.settings()?;
        let source_session = self.source.session().await?;
        let target_session = self.target.session().await?;

        let source_columns = get_columns(source_session.as_ref(), &source.keyspace, &source.table).await?;
        let target_columns = get_columns(target_session.as_ref(), &target.keyspace, &target.table).await?;
        Ok((
            compliance::check(&source_columns, &target_columns),
            target_columns,
        ))
    }

    async fn transfer(&mut self, target_columns: &[Column]) -> Result<TransferStats, PhaseFailure> {
        self.enter(RunState::Extracting);
        let rows = async {
            let source = self.source.settings()?;
            let session = self.source.session().await?;
            read_table(session.as_ref(), &source.keyspace, &source.table).await
        }
        .await
        .map_err(|e| PhaseFailure::new(RunState::Extracting, e))?;

        self.enter(RunState::Inserting);
        async {
            let config = InsertConfig::from_settings(&self.settings, self.target.settings()?);
            let session = self.target.session().await?;
            RowTransfer::new(session, config)
                .transfer(rows, target_columns)
                .await
        }
        .await
        .map_err(|e| PhaseFailure::new(RunState::Inserting, e))
    }

    /// Compare source and target catalogs without moving data.
    pub async fn check_compliance(&mut self) -> MigrationResult<ComplianceReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("compliance_check", %run_id);
        async {
            self.enter(RunState::CheckingCompliance);
            let result = self.compliance_gate().await;
            self.teardown().await;
            self.enter(RunState::Done);
            match result {
                Ok((verdict, _)) => Ok(verdict),
                Err(e) => {
                    let failure = PhaseFailure::new(RunState::CheckingCompliance, e);
                    failure.log();
                    Err(failure.error)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Dispose both sessions. Unbuilt sessions are skipped.
    async fn teardown(&mut self) {
        self.source.dispose().await;
        self.target.dispose().await;
    }
}
