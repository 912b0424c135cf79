pub mod coalesce;
pub mod depth;
pub mod error;
pub mod feed;
pub mod price_history;
pub mod queries;
pub mod rest;
pub mod stream;
pub mod types;

pub use depth::DepthRequest;
pub use error::FeedError;
pub use feed::{FeedConfig, FeedSink, MarketFeed};
pub use price_history::PriceHistory;
pub use rest::{BinanceRest, RestConfig};
pub use types::{base_asset, FundingSnapshot, MarketType, OrderBook, OrderBookLevel, RawTick, Spread, SpreadSnapshot, Ticker, TickerSnapshot};
