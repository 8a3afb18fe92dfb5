//! Feed pipeline stages: fetch, parse, transform, write.

pub mod etherscan;
pub mod sink;
pub mod source;
pub mod table;
pub mod transform;

pub use etherscan::EtherscanSource;
pub use sink::{JsonFileSink, MappingSink, WriteError, WriteReceipt};
pub use source::{FetchError, GasPriceSource, RawFeed};
pub use table::{FeedTable, ParseError};
pub use transform::{transform, PriceMapping, TransformError, WindowStart};
