//! Run status sidecar.
//!
//! A small JSON document written next to the output after every run, so a
//! scheduler can check freshness without reading logs. The fields describing
//! the output file (`latest_timestamp`, `price_entries`, `data_hash`,
//! `last_success_at`) always describe what is on disk: a failed run carries
//! them forward from the previous status.

use crate::feed::sink::{write_atomic, WriteError};
use crate::runner::{RunOutcome, RunReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub succeeded: bool,
    pub attempts: u32,
    pub finished_at: DateTime<Utc>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub latest_timestamp: Option<i64>,
    pub price_entries: Option<usize>,
    pub data_hash: Option<String>,
    pub last_error: Option<String>,
}

impl RunStatus {
    /// Status for a finished run, given whatever status was recorded before it.
    pub fn from_report(report: &RunReport, previous: Option<&RunStatus>) -> Self {
        match &report.outcome {
            RunOutcome::Succeeded {
                price_entries,
                latest_timestamp,
                receipt,
            } => Self {
                succeeded: true,
                attempts: report.attempts,
                finished_at: report.finished_at,
                last_success_at: Some(report.finished_at),
                latest_timestamp: Some(*latest_timestamp),
                price_entries: Some(*price_entries),
                data_hash: Some(receipt.data_hash.clone()),
                last_error: None,
            },
            RunOutcome::Exhausted => Self {
                succeeded: false,
                attempts: report.attempts,
                finished_at: report.finished_at,
                last_success_at: previous.and_then(|p| p.last_success_at),
                latest_timestamp: previous.and_then(|p| p.latest_timestamp),
                price_entries: previous.and_then(|p| p.price_entries),
                data_hash: previous.and_then(|p| p.data_hash.clone()),
                last_error: report.last_error().map(|e| e.to_string()),
            },
        }
    }
}

/// Location of the status sidecar.
#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Previously recorded status. Missing or unreadable files give None.
    pub fn load(&self) -> Option<RunStatus> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(path = %self.path.display(), "ignoring unreadable run status: {e}");
                None
            }
        }
    }

    /// Merge the report with the previous status and write it.
    pub fn record(&self, report: &RunReport) -> Result<RunStatus, WriteError> {
        let previous = self.load();
        let status = RunStatus::from_report(report, previous.as_ref());
        let json = serde_json::to_vec_pretty(&status)?;

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        write_atomic(&self.path, Path::new(&tmp), &json)?;
        Ok(status)
    }
}
