use crate::coalesce::run_coalescer;
use crate::depth::{run_depth_worker, DepthRequest};
use crate::price_history::PriceHistory;
use crate::rest::{BinanceRest, RestConfig};
use crate::stream::run_stream_session;
use crate::types::{base_asset, FundingSnapshot, MarketType, RawTick, Spread, Ticker, TickerSnapshot};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{error, info, warn};

/// Explicit sink the feed pushes derived events into, replacing the
/// callback-field idiom with a constructed interface (see design notes on
/// callback-holding objects).
#[async_trait]
pub trait FeedSink: Send + Sync {
	async fn on_ticker(&self, ticker: Ticker);
	async fn on_spread(&self, spread: Spread);
	async fn on_order_book(&self, book: crate::types::OrderBook);
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
	pub rest: RestConfig,
	pub spot_ws_url: String,
	pub futures_ws_url: String,
	pub rest_poll_interval_secs: u64,
	pub depth_queue_capacity: usize,
}

struct MarketState {
	snapshots: RwLock<HashMap<String, TickerSnapshot>>,
	history: RwLock<HashMap<String, PriceHistory>>,
	last_price: RwLock<HashMap<String, f64>>,
}

impl MarketState {
	fn new() -> Self {
		Self { snapshots: RwLock::new(HashMap::new()), history: RwLock::new(HashMap::new()), last_price: RwLock::new(HashMap::new()) }
	}
}

pub struct MarketFeed {
	config: FeedConfig,
	rest: Arc<BinanceRest>,
	spot: MarketState,
	futures: MarketState,
	sink: Arc<dyn FeedSink>,
	depth_tx: mpsc::Sender<DepthRequest>,
	depth_rx: tokio::sync::Mutex<Option<mpsc::Receiver<DepthRequest>>>,
	funding: RwLock<HashMap<String, FundingSnapshot>>,
}

impl MarketFeed {
	pub fn new(config: FeedConfig, sink: Arc<dyn FeedSink>) -> anyhow::Result<Self> {
		let rest = Arc::new(BinanceRest::new(config.rest.clone())?);
		let (depth_tx, depth_rx) = mpsc::channel(config.depth_queue_capacity);
		Ok(Self {
			config,
			rest,
			spot: MarketState::new(),
			futures: MarketState::new(),
			sink,
			depth_tx,
			depth_rx: tokio::sync::Mutex::new(Some(depth_rx)),
			funding: RwLock::new(HashMap::new()),
		})
	}

	fn state(&self, market: MarketType) -> &MarketState {
		match market {
			MarketType::Spot => &self.spot,
			MarketType::Futures => &self.futures,
		}
	}

	/// Enqueues a depth-sample request; silently dropped if the bounded queue
	/// is full, matching the "overflow silently dropped" requirement.
	pub fn request_depth(&self, symbol: String, market: MarketType) {
		if self.depth_tx.try_send(DepthRequest { symbol, market }).is_err() {
			warn!(market = %market, "depth queue full, dropping request");
		}
	}

	/// Runs the full set of long-lived tasks for this feed until `shutdown`
	/// fires: REST refresher, two stream sessions with their coalescers, and
	/// the depth worker. Mirrors the `tokio::select!`-over-spawned-tasks
	/// orchestration used for subsystem wiring elsewhere in this workspace.
	pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
		let symbols = match self.discover_symbols().await {
			Ok(s) => s,
			Err(e) => {
				error!(error = %e, "symbol discovery failed, feed cannot start");
				return;
			},
		};

		if let Err(e) = self.refresh_snapshots().await {
			warn!(error = %e, "initial snapshot refresh failed");
		}

		let mut handles = Vec::new();

		handles.push(tokio::spawn(self.clone().run_rest_refresher(shutdown.clone())));

		for market in [MarketType::Spot, MarketType::Futures] {
			let syms = symbols.get(&market).cloned().unwrap_or_default();
			handles.push(tokio::spawn(self.clone().run_market_pipeline(market, syms, shutdown.clone())));
		}

		if let Some(rx) = self.depth_rx.lock().await.take() {
			let rest = self.rest.clone();
			let sink = self.sink.clone();
			let shutdown = shutdown.clone();
			handles.push(tokio::spawn(async move {
				run_depth_worker(&rest, rx, shutdown, |book| {
					let sink = sink.clone();
					tokio::spawn(async move { sink.on_order_book(book).await });
				})
				.await;
			}));
		}

		for h in handles {
			let _ = h.await;
		}
	}

	async fn discover_symbols(&self) -> anyhow::Result<HashMap<MarketType, Vec<String>>> {
		let mut out = HashMap::new();
		for market in [MarketType::Spot, MarketType::Futures] {
			let syms = self.rest.fetch_symbols(market).await?;
			info!(market = %market, count = syms.len(), "discovered symbols");
			out.insert(market, syms);
		}
		Ok(out)
	}

	async fn run_rest_refresher(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
		let mut ticker = tokio::time::interval(std::time::Duration::from_secs(self.config.rest_poll_interval_secs));
		loop {
			tokio::select! {
				_ = ticker.tick() => {
					if let Err(e) = self.refresh_snapshots().await {
						warn!(error = %e, "periodic snapshot refresh failed");
					}
				}
				_ = shutdown.changed() => return,
			}
		}
	}

	async fn refresh_snapshots(&self) -> anyhow::Result<()> {
		for market in [MarketType::Spot, MarketType::Futures] {
			let snaps = self.rest.fetch_24h_snapshots(market).await?;
			let mut guard = self.state(market).snapshots.write().await;
			for snap in snaps {
				guard.insert(snap.symbol.clone(), snap);
			}
		}

		let funding = self.rest.fetch_funding_snapshots().await?;
		{
			let mut futures_snapshots = self.futures.snapshots.write().await;
			for snap in &funding {
				if let Some(s) = futures_snapshots.get_mut(&snap.symbol) {
					s.funding_rate_percent = Some(snap.funding_rate_percent);
				}
			}
		}
		let mut guard = self.funding.write().await;
		for snap in funding {
			guard.insert(snap.symbol.clone(), snap);
		}

		Ok(())
	}

	/// Batches leave the coalescer through `batch_tx` into a single serial
	/// processor task rather than being spawned off individually, so that
	/// ticks for this market are applied to `PriceHistory`/`last_price`/
	/// `snapshots` in the order their batches were coalesced: a later batch
	/// can never race ahead of an earlier one.
	async fn run_market_pipeline(self: Arc<Self>, market: MarketType, symbols: Vec<String>, shutdown: watch::Receiver<bool>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let ws_url = match market {
			MarketType::Spot => self.config.spot_ws_url.clone(),
			MarketType::Futures => self.config.futures_ws_url.clone(),
		};

		let stream_task = tokio::spawn(run_stream_session(&market.to_string(), &ws_url, symbols, tx, shutdown.clone()));

		let (batch_tx, mut batch_rx) = mpsc::unbounded_channel::<Vec<RawTick>>();
		let coalesce_task = tokio::spawn(run_coalescer(rx, shutdown.clone(), move |batch| {
			let _ = batch_tx.send(batch);
		}));

		let feed = self.clone();
		let mut process_shutdown = shutdown;
		let processor_task = tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = process_shutdown.changed() => { if *process_shutdown.borrow() { return; } }
					batch = batch_rx.recv() => {
						let Some(batch) = batch else { return };
						feed.process_batch(market, batch).await;
					}
				}
			}
		});

		let _ = stream_task.await;
		let _ = coalesce_task.await;
		let _ = processor_task.await;
	}

	async fn process_batch(&self, market: MarketType, batch: Vec<RawTick>) {
		for tick in batch {
			self.process_tick(market, tick).await;
		}
	}

	/// Tick processing per the four-step contract: update last price / 24h
	/// high-low, append to price history, emit a `Ticker`, and — if the
	/// counterpart market also has a live price — emit a `Spread`.
	async fn process_tick(&self, market: MarketType, tick: RawTick) {
		let now = Utc::now();
		let state = self.state(market);

		{
			let mut last_price = state.last_price.write().await;
			last_price.insert(tick.symbol.clone(), tick.close);
		}
		{
			let mut snapshots = state.snapshots.write().await;
			let snap = snapshots.entry(tick.symbol.clone()).or_insert_with(|| TickerSnapshot { symbol: tick.symbol.clone(), ..Default::default() });
			snap.price = tick.close;
			if tick.high > snap.high {
				snap.high = tick.high;
			}
			if snap.low == 0.0 || tick.low < snap.low {
				snap.low = tick.low;
			}
		}

		let (change_1m, change_5m, change_15m, change_1h, change_24h, volume_change_ratio) = {
			let mut history = state.history.write().await;
			let h = history.entry(tick.symbol.clone()).or_insert_with(PriceHistory::new);
			h.add(now, tick.close, tick.volume);
			let change_24h = state.snapshots.read().await.get(&tick.symbol).map(|s| s.change_percent).unwrap_or(0.0);
			(h.change(now, 1), h.change(now, 5), h.change(now, 15), h.change(now, 60), change_24h, h.volume_ratio(now, 5))
		};

		let volume_24h_quote = state.snapshots.read().await.get(&tick.symbol).map(|s| s.quote_volume).unwrap_or(0.0);

		let ticker = Ticker {
			symbol: tick.symbol.clone(),
			market,
			price: tick.close,
			change_1m,
			change_5m,
			change_15m,
			change_1h,
			change_24h,
			volume_24h_quote,
			volume_change_ratio,
			high_24h: tick.high,
			low_24h: tick.low,
			timestamp: now,
		};
		self.sink.on_ticker(ticker).await;

		let counterpart = match market {
			MarketType::Spot => MarketType::Futures,
			MarketType::Futures => MarketType::Spot,
		};
		let counterpart_price = self.state(counterpart).last_price.read().await.get(&tick.symbol).copied();
		if let Some(counterpart_price) = counterpart_price {
			let funding_rate_percent = self.funding.read().await.get(&tick.symbol).map_or(0.0, |f| f.funding_rate_percent);
			let (spot_price, futures_price) = match market {
				MarketType::Spot => (tick.close, counterpart_price),
				MarketType::Futures => (counterpart_price, tick.close),
			};
			let spread = Spread::new(tick.symbol.clone(), spot_price, futures_price, funding_rate_percent, now);
			self.sink.on_spread(spread).await;
		}
	}

	pub async fn ticker_snapshot(&self, market: MarketType, symbol: &str) -> Option<TickerSnapshot> {
		self.state(market).snapshots.read().await.get(symbol).cloned()
	}

	pub async fn all_snapshots(&self, market: MarketType) -> Vec<TickerSnapshot> {
		self.state(market).snapshots.read().await.values().cloned().collect()
	}

	pub async fn current_price(&self, market: MarketType, symbol: &str) -> Option<f64> {
		self.state(market).last_price.read().await.get(symbol).copied()
	}

	pub async fn funding_snapshot(&self, symbol: &str) -> Option<FundingSnapshot> {
		self.funding.read().await.get(symbol).cloned()
	}

	pub fn quote_asset(&self) -> &str {
		&self.config.rest.quote_asset
	}

	pub fn base_asset_of<'a>(&self, symbol: &'a str) -> &'a str {
		base_asset(symbol, self.quote_asset())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Mutex as StdMutex;

	#[derive(Default)]
	struct RecordingSink {
		tickers: StdMutex<Vec<Ticker>>,
	}

	#[async_trait]
	impl FeedSink for RecordingSink {
		async fn on_ticker(&self, ticker: Ticker) {
			self.tickers.lock().unwrap_or_else(|e| e.into_inner()).push(ticker);
		}
		async fn on_spread(&self, _spread: Spread) {}
		async fn on_order_book(&self, _book: crate::types::OrderBook) {}
	}

	fn test_feed(sink: Arc<dyn FeedSink>) -> MarketFeed {
		MarketFeed::new(
			FeedConfig {
				rest: RestConfig { spot_api_url: "http://localhost".into(), futures_api_url: "http://localhost".into(), quote_asset: "USDT".into() },
				spot_ws_url: "ws://localhost".into(),
				futures_ws_url: "ws://localhost".into(),
				rest_poll_interval_secs: 60,
				depth_queue_capacity: 16,
			},
			sink,
		)
		.expect("builds with a stub base url")
	}

	#[tokio::test]
	async fn process_tick_emits_ticker_with_history_derived_changes() {
		let sink = Arc::new(RecordingSink::default());
		let feed = test_feed(sink.clone());

		feed.process_tick(MarketType::Spot, RawTick { symbol: "BTCUSDT".into(), close: 100.0, volume: 1.0, high: 101.0, low: 99.0 }).await;
		feed.process_tick(MarketType::Spot, RawTick { symbol: "BTCUSDT".into(), close: 110.0, volume: 1.0, high: 111.0, low: 100.0 }).await;

		let tickers = sink.tickers.lock().unwrap();
		assert_eq!(tickers.len(), 2);
		assert!((tickers[1].price - 110.0).abs() < 1e-9);
	}

	#[tokio::test]
	async fn spread_emitted_only_once_both_markets_have_a_price() {
		struct CountingSink {
			spreads: StdMutex<u32>,
		}
		#[async_trait]
		impl FeedSink for CountingSink {
			async fn on_ticker(&self, _t: Ticker) {}
			async fn on_spread(&self, _s: Spread) {
				*self.spreads.lock().unwrap_or_else(|e| e.into_inner()) += 1;
			}
			async fn on_order_book(&self, _b: crate::types::OrderBook) {}
		}
		let sink = Arc::new(CountingSink { spreads: StdMutex::new(0) });
		let feed = test_feed(sink.clone());

		feed.process_tick(MarketType::Spot, RawTick { symbol: "BTCUSDT".into(), close: 100.0, volume: 1.0, high: 100.0, low: 100.0 }).await;
		assert_eq!(*sink.spreads.lock().unwrap(), 0);

		feed.process_tick(MarketType::Futures, RawTick { symbol: "BTCUSDT".into(), close: 101.0, volume: 1.0, high: 101.0, low: 101.0 }).await;
		assert_eq!(*sink.spreads.lock().unwrap(), 1);
	}
}
