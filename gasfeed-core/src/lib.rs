//! Gasfeed Core: refresh job for the historical gas-price JSON file.
//!
//! This crate contains the whole pipeline:
//! - Fetching the gas-price chart CSV (`feed::etherscan`)
//! - Decoding it into a column-addressable table (`feed::table`)
//! - Reshaping it into a timestamp → wei mapping (`feed::transform`)
//! - Atomic JSON persistence (`feed::sink`)
//! - The retrying run controller and its status sidecar (`runner`, `status`)
//! - TOML configuration (`config`)

pub mod config;
pub mod feed;
pub mod runner;
pub mod status;

pub use config::{ConfigError, RefreshConfig};
pub use runner::{run_refresh, Clock, PipelineError, RunOutcome, RunReport, RunSettings, SystemClock};
pub use status::{RunStatus, StatusFile};
