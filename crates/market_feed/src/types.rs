use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketType {
	Spot,
	Futures,
}

impl fmt::Display for MarketType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Spot => write!(f, "spot"),
			Self::Futures => write!(f, "futures"),
		}
	}
}

/// Strips a known quote asset suffix off a symbol, e.g. `base_asset("BTCUSDT", "USDT") == "BTC"`.
pub fn base_asset<'a>(symbol: &'a str, quote: &str) -> &'a str {
	symbol.strip_suffix(quote).unwrap_or(symbol)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
	pub symbol: String,
	pub market: MarketType,
	pub price: f64,
	pub change_1m: Option<f64>,
	pub change_5m: Option<f64>,
	pub change_15m: Option<f64>,
	pub change_1h: Option<f64>,
	pub change_24h: f64,
	pub volume_24h_quote: f64,
	pub volume_change_ratio: f64,
	pub high_24h: f64,
	pub low_24h: f64,
	pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spread {
	pub symbol: String,
	pub spot_price: f64,
	pub futures_price: f64,
	pub spread_percent: f64,
	pub funding_rate_percent: f64,
	pub timestamp: DateTime<Utc>,
}

impl Spread {
	pub fn new(symbol: String, spot_price: f64, futures_price: f64, funding_rate_percent: f64, timestamp: DateTime<Utc>) -> Self {
		let spread_percent = if spot_price > 0.0 { (futures_price - spot_price) / spot_price * 100.0 } else { 0.0 };
		Self { symbol, spot_price, futures_price, spread_percent, funding_rate_percent, timestamp }
	}
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderBookLevel {
	pub price: f64,
	pub quantity: f64,
}

impl OrderBookLevel {
	pub fn value(&self) -> f64 {
		self.price * self.quantity
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
	pub symbol: String,
	pub market: MarketType,
	pub bids: Vec<OrderBookLevel>,
	pub asks: Vec<OrderBookLevel>,
	pub max_bid_order_value: f64,
	pub max_bid_price: f64,
	pub max_ask_order_value: f64,
	pub max_ask_price: f64,
	pub total_bid_value: f64,
	pub total_ask_value: f64,
	pub bid_ask_ratio: f64,
	pub timestamp: DateTime<Utc>,
}

impl OrderBook {
	/// Builds a book from raw levels. `bids` must already be sorted descending by
	/// price, `asks` ascending, matching the wire order the exchange returns.
	pub fn new(symbol: String, market: MarketType, bids: Vec<OrderBookLevel>, asks: Vec<OrderBookLevel>, timestamp: DateTime<Utc>) -> Self {
		let (max_bid_order_value, max_bid_price) = heaviest_level(&bids);
		let (max_ask_order_value, max_ask_price) = heaviest_level(&asks);
		let total_bid_value: f64 = bids.iter().map(OrderBookLevel::value).sum();
		let total_ask_value: f64 = asks.iter().map(OrderBookLevel::value).sum();
		let bid_ask_ratio = if total_ask_value > 0.0 { total_bid_value / total_ask_value } else { 0.0 };

		Self {
			symbol,
			market,
			bids,
			asks,
			max_bid_order_value,
			max_bid_price,
			max_ask_order_value,
			max_ask_price,
			total_bid_value,
			total_ask_value,
			bid_ask_ratio,
			timestamp,
		}
	}
}

fn heaviest_level(levels: &[OrderBookLevel]) -> (f64, f64) {
	levels.iter().map(|l| (l.value(), l.price)).fold((0.0, 0.0), |acc, cur| if cur.0 > acc.0 { cur } else { acc })
}

/// 24h rolling snapshot for a symbol on one market, refreshed by the periodic REST poll.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickerSnapshot {
	pub symbol: String,
	pub price: f64,
	pub change: f64,
	pub change_percent: f64,
	pub high: f64,
	pub low: f64,
	pub volume: f64,
	pub quote_volume: f64,
	pub trades: Option<u64>,
	/// Populated for futures symbols only, joined in from the funding snapshot.
	pub funding_rate_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundingSnapshot {
	pub symbol: String,
	pub funding_rate_percent: f64,
	pub next_funding_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SpreadSnapshot {
	pub symbol: String,
	pub spread_percent: f64,
	pub volume_24h_quote: f64,
}

/// A raw update arriving off the miniTicker-style stream, already symbol-routed.
#[derive(Debug, Clone)]
pub struct RawTick {
	pub symbol: String,
	pub close: f64,
	pub volume: f64,
	pub high: f64,
	pub low: f64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn base_asset_strips_quote_suffix() {
		assert_eq!(base_asset("BTCUSDT", "USDT"), "BTC");
		assert_eq!(base_asset("ETH", "USDT"), "ETH");
	}

	#[test]
	fn order_book_picks_heaviest_level_and_ratio() {
		let bids = vec![OrderBookLevel { price: 100.0, quantity: 1.0 }, OrderBookLevel { price: 99.0, quantity: 10.0 }];
		let asks = vec![OrderBookLevel { price: 101.0, quantity: 2.0 }];
		let book = OrderBook::new("BTCUSDT".into(), MarketType::Spot, bids, asks, Utc::now());

		assert_eq!(book.max_bid_order_value, 990.0);
		assert_eq!(book.max_bid_price, 99.0);
		assert_eq!(book.total_bid_value, 1090.0);
		assert_eq!(book.total_ask_value, 202.0);
		assert!((book.bid_ask_ratio - 1090.0 / 202.0).abs() < 1e-9);
	}

	#[test]
	fn spread_percent_is_signed_relative_move() {
		let s = Spread::new("BTCUSDT".into(), 100.0, 102.0, 0.01, Utc::now());
		assert!((s.spread_percent - 2.0).abs() < 1e-9);
	}
}
