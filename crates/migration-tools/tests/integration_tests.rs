//! Integration tests for migration runs against in-memory clusters.

use chrono::{TimeZone, Utc};
use colmigrate_core::{Column, CqlValue, DataTypeTag, MemoryCluster, MemoryConnector};
use colmigrate_migration_tools::{
    MigrationMode, MigrationOrchestrator, MigrationSettings, RunState,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

struct Clusters {
    connector: MemoryConnector,
    source: MemoryCluster,
    target: MemoryCluster,
}

fn clusters(source_columns: Vec<Column>, target_columns: Vec<Column>) -> Clusters {
    let source = MemoryCluster::new();
    source.create_table("app", "people", source_columns);
    let target = MemoryCluster::new();
    target.create_table("archive", "people", target_columns);

    let connector = MemoryConnector::new();
    connector.register(vec!["src-1".into()], source.clone());
    connector.register(vec!["dst-1".into()], target.clone());
    Clusters {
        connector,
        source,
        target,
    }
}

fn settings(dir: &Path, batch: usize, max_retries: Option<u32>) -> MigrationSettings {
    let data_file = dir.join("export/people.csv");
    let value = json!({
        "taskToExecute": "EndToEnd",
        "connections": {
            "source": { "endpoints": ["src-1"], "port": 9042, "keyspace": "app", "table": "people" },
            "target": { "endpoints": ["dst-1"], "keyspace": "archive", "table": "people" }
        },
        "files": {
            "extraction": { "path": data_file, "hasHeader": true, "delimiter": "," },
            "insertion": { "path": data_file, "hasHeader": true, "delimiter": "," }
        },
        "insertionBatch": batch,
        "retry": { "writeTimeoutDelayMs": 1, "writeTimeoutMaxRetries": max_retries },
        "backpressurePollMs": 1
    });
    MigrationSettings::from_json(&value.to_string()).unwrap()
}

fn id_name() -> Vec<Column> {
    vec![
        Column::new("id", DataTypeTag::Int32),
        Column::new("name", DataTypeTag::Text),
    ]
}

fn orchestrator(clusters: &Clusters, settings: MigrationSettings) -> MigrationOrchestrator {
    MigrationOrchestrator::new(settings, Arc::new(clusters.connector.clone()))
}

#[tokio::test]
async fn test_end_to_end_transfers_rows_into_reordered_target() {
    let dir = tempfile::tempdir().unwrap();
    let clusters = clusters(
        id_name(),
        vec![
            Column::new("name", DataTypeTag::Text),
            Column::new("id", DataTypeTag::Int32),
        ],
    );
    for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
        clusters.source.insert_row(
            "app",
            "people",
            vec![CqlValue::Int32(id), CqlValue::Text(name.into())],
        );
    }

    let mut orchestrator = orchestrator(&clusters, settings(dir.path(), 2, Some(3)));
    let report = orchestrator.run(MigrationMode::EndToEnd).await;

    assert!(report.is_success(), "{:?}", report.failure);
    assert_eq!(report.state, RunState::Done);
    assert!(report.compliance.as_ref().unwrap().compliant);
    let insertion = report.stats.insertion.unwrap();
    assert_eq!(insertion.rows_written, 3);
    assert_eq!(insertion.batches, 2);

    let rows = clusters.target.rows("archive", "people");
    assert_eq!(rows.len(), 3);
    for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
        assert!(rows.contains(&vec![CqlValue::Text(name.into()), CqlValue::Int32(id)]));
    }

    assert_eq!(clusters.source.connections_opened(), 1);
    assert_eq!(clusters.target.connections_opened(), 1);
    assert_eq!(clusters.source.connections_closed(), 1);
    assert_eq!(clusters.target.connections_closed(), 1);
    assert_eq!(orchestrator.state(), RunState::Done);
}

#[tokio::test]
async fn test_end_to_end_aborts_on_column_count_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let mut source_columns = id_name();
    source_columns.push(Column::new("age", DataTypeTag::Int16));
    let clusters = clusters(source_columns, id_name());
    clusters.source.insert_row(
        "app",
        "people",
        vec![CqlValue::Int32(1), CqlValue::Text("a".into()), CqlValue::Int16(30)],
    );

    let mut orchestrator = orchestrator(&clusters, settings(dir.path(), 10, Some(3)));
    let report = orchestrator.run(MigrationMode::EndToEnd).await;

    assert!(!report.is_success());
    assert_eq!(report.failed_phase, Some(RunState::CheckingCompliance));
    let failure = report.failure.unwrap();
    assert!(failure.contains("1 mismatch(es) among 3 columns"), "{failure}");
    assert!(report.stats.insertion.is_none());
    assert!(clusters.target.rows("archive", "people").is_empty());
    assert_eq!(clusters.target.write_attempts(), 0);
    assert_eq!(clusters.source.connections_closed(), 1);
    assert_eq!(clusters.target.connections_closed(), 1);
}

#[tokio::test]
async fn test_extract_then_insert_round_trips_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let columns = vec![
        Column::new("id", DataTypeTag::Int32),
        Column::new("note", DataTypeTag::Text),
        Column::new("created_at", DataTypeTag::Timestamp),
        Column::new("active", DataTypeTag::Boolean),
        Column::new("score", DataTypeTag::Long),
    ];
    let clusters = clusters(columns.clone(), columns);
    let instant = Utc.timestamp_millis_opt(1_614_834_367_890).unwrap();
    let first = vec![
        CqlValue::Int32(1),
        CqlValue::Text(r#"He said "hi", twice"#.into()),
        CqlValue::Timestamp(instant),
        CqlValue::Bool(true),
        CqlValue::Null,
    ];
    let second = vec![
        CqlValue::Int32(2),
        CqlValue::Text("plain".into()),
        CqlValue::Null,
        CqlValue::Bool(false),
        CqlValue::Int64(-7),
    ];
    clusters.source.insert_row("app", "people", first.clone());
    clusters.source.insert_row("app", "people", second.clone());

    let settings = settings(dir.path(), 100, Some(3));
    let mut orchestrator = orchestrator(&clusters, settings);

    let extract = orchestrator.run(MigrationMode::Extract).await;
    assert!(extract.is_success(), "{:?}", extract.failure);
    assert_eq!(extract.stats.extraction.as_ref().unwrap().rows_written, 2);
    assert_eq!(clusters.target.connections_opened(), 0);

    let content = std::fs::read_to_string(dir.path().join("export/people.csv")).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some("id,note,created_at,active,score"));
    assert_eq!(
        lines.next(),
        Some(r#"1,"He said ""hi"", twice",1614834367890,true,"#)
    );

    let insert = orchestrator.run(MigrationMode::Insert).await;
    assert!(insert.is_success(), "{:?}", insert.failure);
    assert_eq!(clusters.source.connections_opened(), 1);

    let rows = clusters.target.rows("archive", "people");
    assert_eq!(rows.len(), 2);
    assert!(rows.contains(&first));
    assert!(rows.contains(&second));
}

#[tokio::test]
async fn test_write_timeouts_are_retried_on_target() {
    let dir = tempfile::tempdir().unwrap();
    let clusters = clusters(id_name(), id_name());
    for id in 1..=3 {
        clusters.source.insert_row(
            "app",
            "people",
            vec![CqlValue::Int32(id), CqlValue::Text(format!("p{id}"))],
        );
    }
    clusters.target.inject_write_timeouts(2);

    let mut orchestrator = orchestrator(&clusters, settings(dir.path(), 10, Some(3)));
    let report = orchestrator.run(MigrationMode::EndToEnd).await;

    assert!(report.is_success(), "{:?}", report.failure);
    assert_eq!(clusters.target.rows("archive", "people").len(), 3);
    assert_eq!(clusters.target.write_attempts(), 5);
}

#[tokio::test]
async fn test_exhausted_write_timeouts_fail_the_insertion() {
    let dir = tempfile::tempdir().unwrap();
    let clusters = clusters(id_name(), id_name());
    clusters.source.insert_row(
        "app",
        "people",
        vec![CqlValue::Int32(1), CqlValue::Text("a".into())],
    );
    clusters.target.inject_write_timeouts(5);

    let mut orchestrator = orchestrator(&clusters, settings(dir.path(), 10, Some(1)));
    let report = orchestrator.run(MigrationMode::EndToEnd).await;

    assert_eq!(report.failed_phase, Some(RunState::Inserting));
    let failure = report.failure.unwrap();
    assert!(failure.starts_with("1 of 1 writes failed"), "{failure}");
    assert!(failure.contains("Write timeout"));
    assert_eq!(clusters.target.write_attempts(), 2);
    assert!(!report.recovery_steps.is_empty());
    assert_eq!(clusters.target.connections_closed(), 1);
}

#[tokio::test]
async fn test_missing_insertion_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let clusters = clusters(id_name(), id_name());

    let mut orchestrator = orchestrator(&clusters, settings(dir.path(), 10, Some(3)));
    let report = orchestrator.run(MigrationMode::Insert).await;

    assert_eq!(report.failed_phase, Some(RunState::Inserting));
    assert!(report.failure.unwrap().starts_with("Cannot access file"));
    assert_eq!(clusters.source.connections_opened(), 0);
    assert_eq!(clusters.target.connections_closed(), clusters.target.connections_opened());
}

#[tokio::test]
async fn test_unreachable_source_fails_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let clusters = clusters(id_name(), id_name());
    let mut settings = settings(dir.path(), 10, Some(3));
    if let Some(source) = settings.connections.source.as_mut() {
        source.endpoints = vec!["nowhere".into()];
    }

    let mut orchestrator = orchestrator(&clusters, settings);
    let report = orchestrator.run(MigrationMode::Extract).await;

    assert_eq!(report.failed_phase, Some(RunState::Extracting));
    assert!(report.failure.unwrap().contains("Connection failed"));
    assert!(!dir.path().join("export/people.csv").exists());
}

#[tokio::test]
async fn test_missing_settings_section_fails_before_connecting() {
    let clusters = clusters(id_name(), id_name());
    let settings = MigrationSettings::from_json("{}").unwrap();

    let mut orchestrator = orchestrator(&clusters, settings);
    let report = orchestrator.run(MigrationMode::EndToEnd).await;

    assert_eq!(report.failed_phase, Some(RunState::Idle));
    assert_eq!(clusters.source.connections_opened(), 0);
    assert_eq!(clusters.target.connections_opened(), 0);
}

#[tokio::test]
async fn test_check_compliance_without_moving_data() {
    let dir = tempfile::tempdir().unwrap();
    let clusters = clusters(
        id_name(),
        vec![
            Column::new("id", DataTypeTag::Long),
            Column::new("name", DataTypeTag::Text),
        ],
    );

    let mut orchestrator = orchestrator(&clusters, settings(dir.path(), 10, Some(3)));
    let verdict = orchestrator.check_compliance().await.unwrap();

    assert!(!verdict.compliant);
    assert_eq!(verdict.mismatches(), 1);
    assert_eq!(clusters.source.connections_closed(), 1);
    assert_eq!(clusters.target.connections_closed(), 1);
}
