//! Settings for a migration run, loaded from a JSON settings file.

use crate::error::{MigrationError, MigrationResult};
use colmigrate_core::ClusterEndpoint;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default native protocol port.
pub const DEFAULT_PORT: u16 = 9042;
/// Default number of rows per insert batch.
pub const DEFAULT_INSERTION_BATCH: usize = 100_000;
/// Default field delimiter.
pub const DEFAULT_DELIMITER: &str = ",";
/// Default wait before retrying a timed-out write.
pub const DEFAULT_WRITE_TIMEOUT_DELAY_MS: u64 = 300;
/// Default ceiling on write-timeout retries per statement.
pub const DEFAULT_WRITE_TIMEOUT_MAX_RETRIES: u32 = 10;
/// Default interval between in-flight polls while throttled.
pub const DEFAULT_BACKPRESSURE_POLL_MS: u64 = 10;

/// Which phases a run executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum MigrationMode {
    /// Source table to delimited file
    Extract,
    /// Delimited file to target table
    Insert,
    /// Source table to target table, gated by a compliance check
    EndToEnd,
}

impl std::fmt::Display for MigrationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MigrationMode::Extract => "extract",
            MigrationMode::Insert => "insert",
            MigrationMode::EndToEnd => "end-to-end",
        };
        f.write_str(name)
    }
}

/// Connection details for one side of the migration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSettings {
    /// Contact points
    pub endpoints: Vec<String>,
    /// Port; zero or negative selects the default
    #[serde(default)]
    pub port: i64,
    /// Keyspace holding the table
    pub keyspace: String,
    /// Table name
    pub table: String,
}

impl ConnectionSettings {
    /// Port with the default applied.
    pub fn port(&self) -> MigrationResult<u16> {
        if self.port <= 0 {
            return Ok(DEFAULT_PORT);
        }
        u16::try_from(self.port)
            .map_err(|_| MigrationError::Config(format!("port {} is out of range", self.port)))
    }

    /// Contact points and port as a client endpoint.
    pub fn endpoint(&self) -> MigrationResult<ClusterEndpoint> {
        Ok(ClusterEndpoint {
            endpoints: self.endpoints.clone(),
            port: self.port()?,
        })
    }

    fn validate(&self, side: &str) -> MigrationResult<()> {
        if self.endpoints.iter().all(|e| e.trim().is_empty()) {
            return Err(MigrationError::Config(format!(
                "{} connection has no endpoints",
                side
            )));
        }
        if self.keyspace.is_empty() || self.table.is_empty() {
            return Err(MigrationError::Config(format!(
                "{} connection needs both keyspace and table",
                side
            )));
        }
        self.port()?;
        Ok(())
    }
}

/// Source and target connections.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connections {
    /// Cluster rows are read from
    pub source: Option<ConnectionSettings>,
    /// Cluster rows are written to
    pub target: Option<ConnectionSettings>,
}

/// Location and format of a delimited file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFileSettings {
    /// File path
    pub path: PathBuf,
    /// Whether the first line holds column names
    #[serde(default)]
    pub has_header: bool,
    /// Field delimiter; empty selects the default
    #[serde(default)]
    pub delimiter: String,
}

impl DataFileSettings {
    /// Delimiter as a single byte, with the default applied.
    pub fn delimiter(&self) -> MigrationResult<u8> {
        let delimiter = if self.delimiter.is_empty() {
            DEFAULT_DELIMITER
        } else {
            self.delimiter.as_str()
        };
        match delimiter.as_bytes() {
            [byte] if byte.is_ascii() => Ok(*byte),
            _ => Err(MigrationError::Config(format!(
                "delimiter must be a single ASCII character, got {:?}",
                delimiter
            ))),
        }
    }
}

/// Extraction output and insertion input files.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFiles {
    /// File written by extraction
    pub extraction: Option<DataFileSettings>,
    /// File read by insertion
    pub insertion: Option<DataFileSettings>,
}

/// Write-timeout retry behaviour for the target session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySettings {
    /// Wait before each retry, in milliseconds
    #[serde(default = "default_write_timeout_delay_ms")]
    pub write_timeout_delay_ms: u64,
    /// Retries per statement; `null` retries without limit
    #[serde(default = "default_write_timeout_max_retries")]
    pub write_timeout_max_retries: Option<u32>,
}

impl RetrySettings {
    /// Retry delay as a duration.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.write_timeout_delay_ms)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            write_timeout_delay_ms: DEFAULT_WRITE_TIMEOUT_DELAY_MS,
            write_timeout_max_retries: default_write_timeout_max_retries(),
        }
    }
}

fn default_write_timeout_delay_ms() -> u64 {
    DEFAULT_WRITE_TIMEOUT_DELAY_MS
}

fn default_write_timeout_max_retries() -> Option<u32> {
    Some(DEFAULT_WRITE_TIMEOUT_MAX_RETRIES)
}

fn default_backpressure_poll_ms() -> u64 {
    DEFAULT_BACKPRESSURE_POLL_MS
}

fn default_task() -> MigrationMode {
    MigrationMode::EndToEnd
}

/// Complete settings for a migration run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSettings {
    /// Mode to run
    #[serde(default = "default_task")]
    pub task_to_execute: MigrationMode,
    /// Cluster connections
    #[serde(default)]
    pub connections: Connections,
    /// Delimited files
    #[serde(default)]
    pub files: DataFiles,
    /// Rows per insert batch; zero or negative selects the default
    #[serde(default)]
    pub insertion_batch: i64,
    /// Write-timeout retry behaviour
    #[serde(default)]
    pub retry: RetrySettings,
    /// Poll interval while throttled, in milliseconds
    #[serde(default = "default_backpressure_poll_ms")]
    pub backpressure_poll_ms: u64,
    /// Show a progress bar during insertion
    #[serde(default)]
    pub show_progress: bool,
}

impl MigrationSettings {
    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> MigrationResult<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| MigrationError::FileAccess {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(&data)
    }

    /// Parse settings from JSON text.
    pub fn from_json(data: &str) -> MigrationResult<Self> {
        serde_json::from_str(data)
            .map_err(|e| MigrationError::Config(format!("invalid settings: {}", e)))
    }

    /// Rows per insert batch with the default applied.
    pub fn batch_size(&self) -> usize {
        if self.insertion_batch > 0 {
            usize::try_from(self.insertion_batch).unwrap_or(DEFAULT_INSERTION_BATCH)
        } else {
            DEFAULT_INSERTION_BATCH
        }
    }

    /// Poll interval while throttled.
    pub fn backpressure_poll(&self) -> Duration {
        Duration::from_millis(self.backpressure_poll_ms.max(1))
    }

    /// Source connection, required.
    pub fn source(&self) -> MigrationResult<&ConnectionSettings> {
        self.connections
            .source
            .as_ref()
            .ok_or_else(|| MigrationError::Config("source connection is not configured".into()))
    }

    /// Target connection, required.
    pub fn target(&self) -> MigrationResult<&ConnectionSettings> {
        self.connections
            .target
            .as_ref()
            .ok_or_else(|| MigrationError::Config("target connection is not configured".into()))
    }

    /// Extraction file, required.
    pub fn extraction_file(&self) -> MigrationResult<&DataFileSettings> {
        self.files
            .extraction
            .as_ref()
            .ok_or_else(|| MigrationError::Config("extraction file is not configured".into()))
    }

    /// Insertion file, required.
    pub fn insertion_file(&self) -> MigrationResult<&DataFileSettings> {
        self.files
            .insertion
            .as_ref()
            .ok_or_else(|| MigrationError::Config("insertion file is not configured".into()))
    }

    /// Check that everything `mode` needs is present and well-formed.
    pub fn validate_for(&self, mode: MigrationMode) -> MigrationResult<()> {
        match mode {
            MigrationMode::Extract => {
                self.source()?.validate("source")?;
                self.extraction_file()?.delimiter()?;
            }
            MigrationMode::Insert => {
                self.target()?.validate("target")?;
                self.insertion_file()?.delimiter()?;
            }
            MigrationMode::EndToEnd => {
                self.source()?.validate("source")?;
                self.target()?.validate("target")?;
            }
        }
        Ok(())
    }
}
