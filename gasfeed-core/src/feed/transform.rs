//! Feed table → timestamp/price mapping.
//!
//! The output keeps every selected `(timestamp, wei)` pair plus the timestamp of
//! the newest row in the feed, which consumers use as a freshness marker.

use super::table::FeedTable;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

pub const DATE_COLUMN: &str = "Date(UTC)";
pub const TIMESTAMP_COLUMN: &str = "UnixTimeStamp";
pub const PRICE_COLUMN: &str = "Value (Wei)";

/// Reserved key holding the newest feed timestamp in the serialized mapping.
pub const LATEST_KEY: &str = "latest";

/// Row index of 2021-08-31 in the feed, which starts on 2015-07-30.
pub const DEFAULT_ROW_OFFSET: usize = 2224;

/// Errors from reshaping the table.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("required column '{0}' is missing")]
    MissingColumn(String),

    #[error("feed has no rows")]
    EmptyFeed,

    #[error("non-numeric value '{value}' in column '{column}' at row {row}")]
    NonNumeric {
        column: String,
        row: usize,
        value: String,
    },
}

/// First row kept in the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStart {
    /// Keep rows at or after this 0-based row index. Rows before the offset
    /// are skipped unread, so bad cells there are not errors.
    RowOffset(usize),
    /// Keep rows whose timestamp is at or after this UNIX time. Selecting the
    /// window reads every timestamp, so a bad timestamp anywhere in the feed
    /// is an error. Prices are still only checked inside the window.
    Since(i64),
}

impl Default for WindowStart {
    fn default() -> Self {
        WindowStart::RowOffset(DEFAULT_ROW_OFFSET)
    }
}

/// Timestamp → gas price (wei), plus the newest timestamp in the feed.
///
/// Serializes as one flat JSON object: decimal timestamp keys in ascending
/// order, then `"latest"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceMapping {
    pub prices: BTreeMap<i64, u64>,
    pub latest: i64,
}

impl PriceMapping {
    /// Number of keys in the serialized object, `"latest"` included.
    pub fn key_count(&self) -> usize {
        self.prices.len() + 1
    }

    pub fn get(&self, timestamp: i64) -> Option<u64> {
        self.prices.get(&timestamp).copied()
    }
}

impl Serialize for PriceMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.key_count()))?;
        for (ts, wei) in &self.prices {
            map.serialize_entry(&ts.to_string(), wei)?;
        }
        map.serialize_entry(LATEST_KEY, &self.latest)?;
        map.end()
    }
}

/// Drop the date column and build the mapping from the selected window.
pub fn transform(mut table: FeedTable, window: WindowStart) -> Result<PriceMapping, TransformError> {
    if !table.drop_column(DATE_COLUMN) {
        return Err(TransformError::MissingColumn(DATE_COLUMN.into()));
    }

    let timestamps = table
        .column(TIMESTAMP_COLUMN)
        .ok_or_else(|| TransformError::MissingColumn(TIMESTAMP_COLUMN.into()))?;
    let prices = table
        .column(PRICE_COLUMN)
        .ok_or_else(|| TransformError::MissingColumn(PRICE_COLUMN.into()))?;

    let last_row = timestamps.len().checked_sub(1).ok_or(TransformError::EmptyFeed)?;
    let latest = parse_cell::<i64>(TIMESTAMP_COLUMN, last_row, timestamps[last_row])?;

    let selected: Vec<usize> = match window {
        WindowStart::RowOffset(offset) => (offset..timestamps.len()).collect(),
        WindowStart::Since(since) => {
            let mut rows = Vec::new();
            for (row, cell) in timestamps.iter().enumerate() {
                if parse_cell::<i64>(TIMESTAMP_COLUMN, row, cell)? >= since {
                    rows.push(row);
                }
            }
            rows
        }
    };

    let mut mapping = PriceMapping {
        prices: BTreeMap::new(),
        latest,
    };
    for row in selected {
        let ts = parse_cell::<i64>(TIMESTAMP_COLUMN, row, timestamps[row])?;
        let wei = parse_cell::<u64>(PRICE_COLUMN, row, prices[row])?;
        // Later rows win on duplicate timestamps.
        mapping.prices.insert(ts, wei);
    }

    Ok(mapping)
}

fn parse_cell<T: std::str::FromStr>(column: &str, row: usize, cell: &str) -> Result<T, TransformError> {
    cell.trim().parse().map_err(|_| TransformError::NonNumeric {
        column: column.to_string(),
        row,
        value: cell.to_string(),
    })
}
