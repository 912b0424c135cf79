use crate::types::{FundingSnapshot, OrderBook, OrderBookLevel, MarketType, TickerSnapshot};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Thin REST client over the two Binance-style market bases this system
/// consumes: spot (`api_url`) and USDT-margined futures (`futures_url`).
#[derive(Debug, Clone)]
pub struct RestConfig {
	pub spot_api_url: String,
	pub futures_api_url: String,
	pub quote_asset: String,
}

pub struct BinanceRest {
	client: Client,
	config: RestConfig,
}

impl BinanceRest {
	pub fn new(config: RestConfig) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_secs(30)).build().context("failed to build REST client")?;
		Ok(Self { client, config })
	}

	fn base_url(&self, market: MarketType) -> &str {
		match market {
			MarketType::Spot => &self.config.spot_api_url,
			MarketType::Futures => &self.config.futures_api_url,
		}
	}

	/// Fetches the tradable symbol universe for one market, filtered to the
	/// configured quote asset and to actively trading pairs.
	pub async fn fetch_symbols(&self, market: MarketType) -> Result<Vec<String>> {
		let path = match market {
			MarketType::Spot => "/api/v3/exchangeInfo",
			MarketType::Futures => "/fapi/v1/exchangeInfo",
		};
		let url = format!("{}{path}", self.base_url(market));
		let info: ExchangeInfo = self.client.get(&url).send().await?.json().await.context("decode exchangeInfo")?;

		Ok(info
			.symbols
			.into_iter()
			.filter(|s| {
				s.status == "TRADING"
					&& s.quote_asset == self.config.quote_asset
					&& match market {
						MarketType::Spot => true,
						MarketType::Futures => s.contract_type.as_deref() == Some("PERPETUAL"),
					}
			})
			.map(|s| s.symbol)
			.collect())
	}

	/// Fetches the full 24h snapshot for every symbol on one market in one call.
	pub async fn fetch_24h_snapshots(&self, market: MarketType) -> Result<Vec<TickerSnapshot>> {
		let path = match market {
			MarketType::Spot => "/api/v3/ticker/24hr",
			MarketType::Futures => "/fapi/v1/ticker/24hr",
		};
		let url = format!("{}{path}", self.base_url(market));
		let rows: Vec<Ticker24h> = self.client.get(&url).send().await?.json().await.context("decode ticker/24hr")?;

		Ok(rows
			.into_iter()
			.filter_map(|r| {
				Some(TickerSnapshot {
					symbol: r.symbol,
					price: r.last_price.parse().ok()?,
					change: r.price_change.parse().ok()?,
					change_percent: r.price_change_percent.parse().ok()?,
					high: r.high_price.parse().ok()?,
					low: r.low_price.parse().ok()?,
					volume: r.volume.parse().ok()?,
					quote_volume: r.quote_volume.parse().ok()?,
					trades: if market == MarketType::Spot { Some(r.count) } else { None },
					funding_rate_percent: None,
				})
			})
			.collect())
	}

	/// Futures-only: `premiumIndex` carries the current funding rate and next
	/// funding timestamp for every perpetual symbol in one call.
	pub async fn fetch_funding_snapshots(&self) -> Result<Vec<FundingSnapshot>> {
		let url = format!("{}/fapi/v1/premiumIndex", self.config.futures_api_url);
		let rows: Vec<PremiumIndex> = self.client.get(&url).send().await?.json().await.context("decode premiumIndex")?;

		Ok(rows
			.into_iter()
			.map(|r| FundingSnapshot {
				symbol: r.symbol,
				funding_rate_percent: r.last_funding_rate.parse::<f64>().unwrap_or(0.0) * 100.0,
				next_funding_time: DateTime::from_timestamp_millis(r.next_funding_time),
			})
			.collect())
	}

	/// Fetches the top `limit` levels of each side for one symbol/market and
	/// builds an `OrderBook`.
	pub async fn fetch_depth(&self, market: MarketType, symbol: &str, limit: u32, now: DateTime<Utc>) -> Result<OrderBook> {
		let path = match market {
			MarketType::Spot => "/api/v3/depth",
			MarketType::Futures => "/fapi/v1/depth",
		};
		let url = format!("{}{path}?symbol={symbol}&limit={limit}", self.base_url(market));
		let raw: DepthResponse = self.client.get(&url).send().await?.json().await.context("decode depth")?;

		let parse_levels = |levels: Vec<[String; 2]>| -> Vec<OrderBookLevel> {
			levels
				.into_iter()
				.filter_map(|[p, q]| Some(OrderBookLevel { price: p.parse().ok()?, quantity: q.parse().ok()? }))
				.collect()
		};

		Ok(OrderBook::new(symbol.to_string(), market, parse_levels(raw.bids), parse_levels(raw.asks), now))
	}
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
	symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
	symbol: String,
	status: String,
	quote_asset: String,
	#[serde(default)]
	contract_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
	symbol: String,
	price_change: String,
	price_change_percent: String,
	last_price: String,
	high_price: String,
	low_price: String,
	volume: String,
	quote_volume: String,
	#[serde(default)]
	count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PremiumIndex {
	symbol: String,
	last_funding_rate: String,
	next_funding_time: i64,
}

#[derive(Debug, Deserialize)]
struct DepthResponse {
	bids: Vec<[String; 2]>,
	asks: Vec<[String; 2]>,
}
