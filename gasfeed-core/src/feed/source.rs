//! Gas-price source trait and fetch error types.
//!
//! The GasPriceSource trait abstracts over where the raw CSV comes from so the
//! run controller can be driven by an in-memory source in tests.

use thiserror::Error;

/// Raw response payload from a source, before any decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFeed {
    bytes: Vec<u8>,
}

impl RawFeed {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Errors from fetching the feed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("failed to read response body: {0}")]
    Body(String),
}

/// A place the historical gas-price CSV can be read from.
pub trait GasPriceSource {
    /// Human-readable name of this source, used in log lines.
    fn name(&self) -> &str;

    /// Perform one read of the feed.
    fn fetch(&self) -> Result<RawFeed, FetchError>;
}
