//! Gasfeed CLI: refresh the historical gas-price JSON file.
//!
//! With no arguments, downloads the Etherscan gas-price chart, keeps rows from
//! the default window onward, and rewrites `./src/historicalGasPrices.json`.
//! Flags override the config file, which overrides the built-in defaults.
//!
//! The process exits 0 once a run has happened, whether it succeeded or ran
//! out of attempts. Check the status sidecar to tell the two apart.

use anyhow::Result;
use clap::Parser;
use gasfeed_core::feed::{EtherscanSource, JsonFileSink, WindowStart};
use gasfeed_core::{run_refresh, RefreshConfig, RunReport, StatusFile, SystemClock};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gasfeed",
    about = "Refresh the historical gas-price JSON file from the Etherscan chart export"
)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Feed URL.
    #[arg(long)]
    url: Option<String>,

    /// User-agent header sent with the request.
    #[arg(long)]
    user_agent: Option<String>,

    /// Output JSON path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Status sidecar path. Defaults to `<output>.status.json`.
    #[arg(long, conflicts_with = "no_status")]
    status: Option<PathBuf>,

    /// Do not write the status sidecar.
    #[arg(long, default_value_t = false)]
    no_status: bool,

    /// Keep rows from this 0-based row index onward.
    #[arg(long, conflicts_with = "since")]
    row_offset: Option<usize>,

    /// Keep rows with a UNIX timestamp at or after this value.
    #[arg(long)]
    since: Option<i64>,

    /// Attempts before giving up.
    #[arg(long)]
    max_attempts: Option<u32>,

    /// HTTP request timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Delay before the first retry in milliseconds (doubles per retry, 0 disables).
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Longest single wait between attempts in milliseconds.
    #[arg(long)]
    max_retry_delay_ms: Option<u64>,
}

impl Cli {
    fn into_config(self) -> Result<RefreshConfig> {
        let mut config = match &self.config {
            Some(path) => RefreshConfig::from_file(path)?,
            None => RefreshConfig::default(),
        };

        if let Some(url) = self.url {
            config.url = url;
        }
        if let Some(user_agent) = self.user_agent {
            config.user_agent = user_agent;
        }
        if let Some(output) = self.output {
            config.output_path = output;
        }
        if let Some(status) = self.status {
            config.status_path = Some(status);
            config.write_status = true;
        }
        if self.no_status {
            config.write_status = false;
        }
        if let Some(offset) = self.row_offset {
            config.window = WindowStart::RowOffset(offset);
        }
        if let Some(since) = self.since {
            config.window = WindowStart::Since(since);
        }
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.timeout_secs = timeout_secs;
        }
        if let Some(retry_delay_ms) = self.retry_delay_ms {
            config.retry_delay_ms = retry_delay_ms;
        }
        if let Some(max_retry_delay_ms) = self.max_retry_delay_ms {
            config.max_retry_delay_ms = max_retry_delay_ms;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config()?;
    let report = refresh(&config);

    tracing::debug!(
        attempts = report.attempts,
        succeeded = report.succeeded(),
        output = %config.output_path.display(),
        "run finished"
    );

    Ok(())
}

/// One refresh run against the configured feed and output.
fn refresh(config: &RefreshConfig) -> RunReport {
    let source = EtherscanSource::new(config.url.as_str(), &config.user_agent, config.timeout());
    let sink = JsonFileSink::new(&config.output_path);
    let status = config.resolved_status_path().map(StatusFile::new);

    run_refresh(
        &source,
        &sink,
        &SystemClock,
        &config.run_settings(),
        status.as_ref(),
    )
}
