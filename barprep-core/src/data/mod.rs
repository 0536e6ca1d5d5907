//! Data source collaborators: remote provider and local file reader.

pub mod provider;
pub mod reader;
pub mod yahoo;

pub use provider::{FetchRequest, MarketDataProvider, TableReader};
pub use reader::FileTableReader;
pub use yahoo::YahooProvider;
