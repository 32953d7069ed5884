//! Run completion summaries and their sinks.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::{LoadConfig, SchedulingMode},
    state::RunCounters,
};

/// Default location of the summary log.
pub const DEFAULT_SUMMARY_PATH: &str = "logs/simulation.log";

/// Failure to persist a summary.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The summary file could not be opened or written.
    #[error("failed to write run summary to {path}: {source}")]
    Io {
        /// Summary file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The summary could not be serialised.
    #[error("failed to encode run summary: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Effective parameters of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunParameters {
    /// Concurrency width.
    pub concurrency: usize,
    /// Interval between rounds, in milliseconds.
    pub tx_interval_ms: u64,
    /// Complexity level.
    pub complexity: u8,
    /// Number of sender accounts used.
    pub account_count: usize,
    /// Number of rotation groups.
    pub rotation_groups: usize,
    /// Scheduling model.
    pub mode: SchedulingMode,
}

/// Counters of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    /// Milliseconds from run start to the first success.
    pub first_success_latency_ms: Option<u64>,
    /// Attempts started.
    pub total_transactions: u64,
    /// Attempts that succeeded.
    pub successful_transactions: u64,
    /// Attempts that failed, timeouts included.
    pub failed_transactions: u64,
    /// Attempts abandoned at their deadline.
    pub timed_out_transactions: u64,
    /// Run length in seconds.
    pub total_time_seconds: f64,
    /// Successful transactions per second.
    pub throughput: f64,
    /// Requests still queued when the report was produced.
    pub pending_requests: usize,
}

/// Structured record produced when a run completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// When the run completed.
    pub timestamp: DateTime<Utc>,
    /// Effective run parameters.
    pub parameters: RunParameters,
    /// Final counters.
    pub metrics: RunMetrics,
}

impl RunSummary {
    /// Builds the summary of a run from its configuration and final counters.
    pub fn new(
        config: &LoadConfig,
        account_count: usize,
        counters: &RunCounters,
        pending_requests: usize,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            parameters: RunParameters {
                concurrency: config.concurrency,
                tx_interval_ms: u64::try_from(config.tx_interval.as_millis()).unwrap_or(u64::MAX),
                complexity: config.complexity,
                account_count,
                rotation_groups: config.rotation_groups,
                mode: config.mode,
            },
            metrics: RunMetrics {
                first_success_latency_ms: counters
                    .first_success
                    .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
                total_transactions: counters.total,
                successful_transactions: counters.success,
                failed_transactions: counters.failed,
                timed_out_transactions: counters.timed_out,
                total_time_seconds: counters.elapsed.as_secs_f64(),
                throughput: counters.throughput(),
                pending_requests,
            },
        }
    }
}

/// Destination of run summaries.
pub trait SummarySink: Send + Sync {
    /// Persists one summary.
    fn write(&self, summary: &RunSummary) -> Result<(), ReportError>;
}

/// Appends each summary as one JSON line to a file.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl JsonLinesSink {
    /// Creates a sink appending to `path`. The file is opened on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), file: Mutex::new(None) }
    }

    /// Path summaries are appended to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&self.path)
    }
}

impl Default for JsonLinesSink {
    fn default() -> Self {
        Self::new(DEFAULT_SUMMARY_PATH)
    }
}

impl SummarySink for JsonLinesSink {
    fn write(&self, summary: &RunSummary) -> Result<(), ReportError> {
        let mut line = serde_json::to_vec(summary)?;
        line.push(b'\n');

        let io_err = |source| ReportError::Io { path: self.path.clone(), source };
        let mut file = self.file.lock();
        if file.is_none() {
            *file = Some(self.open().map_err(io_err)?);
        }
        if let Some(file) = file.as_mut() {
            file.write_all(&line).map_err(io_err)?;
            file.flush().map_err(io_err)?;
        }
        Ok(())
    }
}
