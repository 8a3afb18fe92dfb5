//! Run controller: fetch → parse → transform → write, retried as a unit.
//!
//! A run never fails from the caller's point of view. Every stage error is
//! logged and counted as one attempt; once the attempt budget is spent the run
//! ends with [`RunOutcome::Exhausted`] and the output file is left untouched.
//! Callers (and schedulers) learn what happened from the returned
//! [`RunReport`] and the status sidecar.

use crate::feed::{
    transform, FeedTable, FetchError, GasPriceSource, MappingSink, ParseError, TransformError,
    WindowStart, WriteError, WriteReceipt,
};
use crate::status::StatusFile;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Any stage failure. All variants are retried the same way.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("write failed: {0}")]
    Write(#[from] WriteError),
}

/// Wall clock and sleeping, injectable for tests.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub window: WindowStart,
    pub max_attempts: u32,
    /// Wait before the first retry, doubled for each later retry.
    pub retry_delay: Duration,
    /// Upper bound on any single wait.
    pub max_retry_delay: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            window: WindowStart::default(),
            max_attempts: crate::config::DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(60),
        }
    }
}

impl RunSettings {
    /// Delay before the given 1-based attempt. The first attempt never waits.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 || self.retry_delay.is_zero() {
            return Duration::ZERO;
        }
        self.retry_delay
            .saturating_mul(2u32.saturating_pow(attempt - 2))
            .min(self.max_retry_delay)
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The mapping was written.
    Succeeded {
        price_entries: usize,
        latest_timestamp: i64,
        receipt: WriteReceipt,
    },
    /// Every attempt failed; nothing was written.
    Exhausted,
}

#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// One entry per failed attempt, oldest first.
    pub errors: Vec<PipelineError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, RunOutcome::Succeeded { .. })
    }

    pub fn last_error(&self) -> Option<&PipelineError> {
        self.errors.last()
    }
}

/// Run the refresh pipeline with retries, then record the status sidecar.
///
/// Never returns an error: failures are logged and summarized in the report.
pub fn run_refresh(
    source: &dyn GasPriceSource,
    sink: &dyn MappingSink,
    clock: &dyn Clock,
    settings: &RunSettings,
    status: Option<&StatusFile>,
) -> RunReport {
    let started_at = clock.now();
    let max_attempts = settings.max_attempts.max(1);
    let mut errors = Vec::new();
    let mut outcome = RunOutcome::Exhausted;
    let mut attempts = 0;

    for attempt in 1..=max_attempts {
        let delay = settings.delay_before(attempt);
        if !delay.is_zero() {
            debug!(?delay, attempt, "waiting before retry");
            clock.sleep(delay);
        }

        attempts = attempt;
        match run_once(source, sink, settings.window) {
            Ok(done) => {
                info!(
                    source = source.name(),
                    attempt,
                    price_entries = done.price_entries,
                    latest = done.latest_timestamp,
                    data_hash = %done.receipt.data_hash,
                    "gas price history refreshed"
                );
                outcome = RunOutcome::Succeeded {
                    price_entries: done.price_entries,
                    latest_timestamp: done.latest_timestamp,
                    receipt: done.receipt,
                };
                break;
            }
            Err(e) => {
                error!(attempt, max_attempts, "{e}");
                errors.push(e);
            }
        }
    }

    if !matches!(outcome, RunOutcome::Succeeded { .. }) {
        error!(attempts, "giving up, output left unchanged");
    }

    let report = RunReport {
        outcome,
        attempts,
        errors,
        started_at,
        finished_at: clock.now(),
    };

    if let Some(status) = status {
        if let Err(e) = status.record(&report) {
            warn!(path = %status.path().display(), "failed to record run status: {e}");
        }
    }

    report
}

struct AttemptResult {
    price_entries: usize,
    latest_timestamp: i64,
    receipt: WriteReceipt,
}

/// One pass through all four stages.
fn run_once(
    source: &dyn GasPriceSource,
    sink: &dyn MappingSink,
    window: WindowStart,
) -> Result<AttemptResult, PipelineError> {
    let raw = source.fetch()?;
    debug!(source = source.name(), bytes = raw.len(), "feed fetched");

    let table = FeedTable::parse(&raw)?;
    debug!(rows = table.row_count(), "feed parsed");

    let mapping = transform(table, window)?;
    let receipt = sink.write(&mapping)?;

    Ok(AttemptResult {
        price_entries: mapping.prices.len(),
        latest_timestamp: mapping.latest,
        receipt,
    })
}
