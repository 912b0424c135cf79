use crate::cooldown::CooldownTable;
use crate::evaluation::{admits_order_book, admits_spread, admits_ticker, evaluate_order_book, evaluate_spread, evaluate_ticker};
use crate::ids::IdGen;
use crate::types::{Alert, AlertType};
use async_trait::async_trait;
use chrono::Utc;
use market_feed::{FeedSink, MarketFeed, MarketType, OrderBook, Spread, Ticker};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};
use user_config::{UserConfig, UserConfigStore};

const USER_CACHE_TTL: Duration = Duration::from_secs(30);

/// Destination for alerts the engine fires, decoupling it from whatever
/// dispatches them (mirrors the explicit-sink pattern `market_feed` uses
/// for its own derived events).
#[async_trait]
pub trait AlertSink: Send + Sync {
	async fn on_alert(&self, alert: Alert, user: UserConfig);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EngineStats {
	pub total_alerts: u64,
	pub escalation_count: u64,
	pub big_order_alerts: u64,
	pub active_cooldowns: usize,
	pub cached_users: usize,
}

pub struct AlertEngine {
	users: Arc<dyn UserConfigStore>,
	feed: Arc<MarketFeed>,
	sink: Arc<dyn AlertSink>,
	cooldowns: Mutex<CooldownTable>,
	ids: IdGen,
	cached_users: RwLock<Vec<UserConfig>>,
	cache_time: RwLock<Option<Instant>>,
	total_alerts: AtomicU64,
	big_order_alerts: AtomicU64,
}

impl AlertEngine {
	pub fn new(users: Arc<dyn UserConfigStore>, feed: Arc<MarketFeed>, sink: Arc<dyn AlertSink>) -> Self {
		Self {
			users,
			feed,
			sink,
			cooldowns: Mutex::new(CooldownTable::new()),
			ids: IdGen::new(),
			cached_users: RwLock::new(Vec::new()),
			cache_time: RwLock::new(None),
			total_alerts: AtomicU64::new(0),
			big_order_alerts: AtomicU64::new(0),
		}
	}

	/// Invalidates the active-user cache; callers wire this to the
	/// boundary's user-profile mutation hooks per the store contract.
	pub async fn invalidate_user_cache(&self) {
		*self.cache_time.write().await = None;
	}

	async fn active_users(&self) -> anyhow::Result<Vec<UserConfig>> {
		let stale = {
			let cache_time = self.cache_time.read().await;
			cache_time.is_none_or(|t| t.elapsed() >= USER_CACHE_TTL)
		};

		if stale {
			let users = self.users.get_active_users().await?;
			debug!(count = users.len(), "refreshed active user cache");
			*self.cached_users.write().await = users.clone();
			*self.cache_time.write().await = Some(Instant::now());
			return Ok(users);
		}

		Ok(self.cached_users.read().await.clone())
	}

	async fn emit(&self, alert: Alert, user: UserConfig) {
		self.total_alerts.fetch_add(1, Ordering::Relaxed);
		if matches!(alert.alert_type, AlertType::BigBidOrder | AlertType::BigAskOrder) {
			self.big_order_alerts.fetch_add(1, Ordering::Relaxed);
		}
		info!(user_id = alert.target_user_id, symbol = %alert.symbol, alert_type = ?alert.alert_type, level = ?alert.level, "alert fired");
		self.sink.on_alert(alert, user).await;
	}

	#[must_use]
	pub async fn stats(&self) -> EngineStats {
		let cooldowns = self.cooldowns.lock().await;
		EngineStats {
			total_alerts: self.total_alerts.load(Ordering::Relaxed),
			escalation_count: cooldowns.escalation_count(),
			big_order_alerts: self.big_order_alerts.load(Ordering::Relaxed),
			active_cooldowns: cooldowns.active_cooldowns(),
			cached_users: self.cached_users.read().await.len(),
		}
	}

	/// Clears cooldown state for `(user, symbol)`, used by the dispatcher's
	/// mute path so a freshly-muted symbol doesn't carry stale escalation
	/// state into its next unmuted window.
	pub async fn clear_cooldowns(&self, user_id: u64, symbol: &str) {
		self.cooldowns.lock().await.clear(user_id, symbol);
	}
}

#[async_trait]
impl FeedSink for AlertEngine {
	async fn on_ticker(&self, ticker: Ticker) {
		let Ok(users) = self.active_users().await else { return };
		if users.is_empty() {
			return;
		}

		let now = Utc::now();
		let mut triggered = false;

		for user in &users {
			if !admits_ticker(user, &ticker) {
				continue;
			}
			let alerts = {
				let mut cooldowns = self.cooldowns.lock().await;
				evaluate_ticker(user, &ticker, &mut cooldowns, &self.ids, now)
			};
			if !alerts.is_empty() {
				triggered = true;
			}
			for alert in alerts {
				self.emit(alert, user.clone()).await;
			}
		}

		if triggered {
			self.feed.request_depth(ticker.symbol.clone(), ticker.market);
		}
	}

	async fn on_spread(&self, spread: Spread) {
		let Ok(users) = self.active_users().await else { return };
		if users.is_empty() {
			return;
		}

		let volume_24h_quote = self.feed.ticker_snapshot(MarketType::Spot, &spread.symbol).await.map_or(0.0, |s| s.quote_volume);
		let now = Utc::now();

		for user in &users {
			if !admits_spread(user, &spread.symbol, volume_24h_quote) {
				continue;
			}
			let alerts = {
				let mut cooldowns = self.cooldowns.lock().await;
				evaluate_spread(user, &spread, volume_24h_quote, &mut cooldowns, &self.ids, now)
			};
			for alert in alerts {
				self.emit(alert, user.clone()).await;
			}
		}
	}

	async fn on_order_book(&self, book: OrderBook) {
		let Ok(users) = self.active_users().await else { return };
		if users.is_empty() {
			return;
		}

		let volume_24h_quote = self.feed.ticker_snapshot(book.market, &book.symbol).await.map_or(0.0, |s| s.quote_volume);
		let current_price = self.feed.current_price(book.market, &book.symbol).await.unwrap_or(0.0);
		let now = Utc::now();

		for user in &users {
			if !admits_order_book(user, &book, volume_24h_quote) {
				continue;
			}
			let alerts = {
				let mut cooldowns = self.cooldowns.lock().await;
				evaluate_order_book(user, &book, current_price, volume_24h_quote, &mut cooldowns, &self.ids, now)
			};
			for alert in alerts {
				self.emit(alert, user.clone()).await;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use market_feed::{FeedConfig, RestConfig};
	use std::sync::atomic::AtomicUsize;
	use tokio::sync::Mutex as TokioMutex;
	use user_config::UserConfig;

	struct RecordingStore {
		users: Vec<UserConfig>,
	}

	#[async_trait]
	impl UserConfigStore for RecordingStore {
		async fn get_active_users(&self) -> anyhow::Result<Vec<UserConfig>> {
			Ok(self.users.clone())
		}
		async fn get(&self, user_id: u64) -> anyhow::Result<Option<UserConfig>> {
			Ok(self.users.iter().find(|u| u.user_id == user_id).cloned())
		}
		async fn upsert(&self, _config: UserConfig) -> anyhow::Result<()> {
			Ok(())
		}
	}

	struct RecordingSink {
		alerts: TokioMutex<Vec<Alert>>,
		count: AtomicUsize,
	}

	#[async_trait]
	impl AlertSink for RecordingSink {
		async fn on_alert(&self, alert: Alert, _user: UserConfig) {
			self.count.fetch_add(1, Ordering::Relaxed);
			self.alerts.lock().await.push(alert);
		}
	}

	fn test_feed() -> Arc<MarketFeed> {
		let config = FeedConfig {
			rest: RestConfig { spot_api_url: "http://localhost".into(), futures_api_url: "http://localhost".into(), quote_asset: "USDT".into() },
			spot_ws_url: "ws://localhost".into(),
			futures_ws_url: "ws://localhost".into(),
			rest_poll_interval_secs: 60,
			depth_queue_capacity: 8,
		};
		struct NoopSink;
		#[async_trait]
		impl FeedSink for NoopSink {
			async fn on_ticker(&self, _t: Ticker) {}
			async fn on_spread(&self, _s: Spread) {}
			async fn on_order_book(&self, _b: OrderBook) {}
		}
		Arc::new(MarketFeed::new(config, Arc::new(NoopSink)).unwrap())
	}

	#[tokio::test]
	async fn ticker_pump_emits_one_alert_to_sink() {
		let users = vec![UserConfig { user_id: 7, ..Default::default() }];
		let store = Arc::new(RecordingStore { users });
		let sink = Arc::new(RecordingSink { alerts: TokioMutex::new(Vec::new()), count: AtomicUsize::new(0) });
		let engine = AlertEngine::new(store, test_feed(), sink.clone());

		let ticker = Ticker {
			symbol: "BTCUSDT".into(),
			market: MarketType::Spot,
			price: 100.0,
			change_1m: Some(8.0),
			change_5m: None,
			change_15m: None,
			change_1h: None,
			change_24h: 0.0,
			volume_24h_quote: 5_000_000.0,
			volume_change_ratio: 1.0,
			high_24h: 110.0,
			low_24h: 90.0,
			timestamp: Utc::now(),
		};

		engine.on_ticker(ticker).await;

		assert_eq!(sink.count.load(Ordering::Relaxed), 1);
		let recorded = sink.alerts.lock().await;
		assert_eq!(recorded[0].alert_type, AlertType::PricePump);
	}

	#[tokio::test]
	async fn stats_reflect_emitted_alerts() {
		let users = vec![UserConfig { user_id: 7, ..Default::default() }];
		let store = Arc::new(RecordingStore { users });
		let sink = Arc::new(RecordingSink { alerts: TokioMutex::new(Vec::new()), count: AtomicUsize::new(0) });
		let engine = AlertEngine::new(store, test_feed(), sink);

		let ticker = Ticker {
			symbol: "BTCUSDT".into(),
			market: MarketType::Spot,
			price: 100.0,
			change_1m: Some(8.0),
			change_5m: None,
			change_15m: None,
			change_1h: None,
			change_24h: 0.0,
			volume_24h_quote: 5_000_000.0,
			volume_change_ratio: 1.0,
			high_24h: 110.0,
			low_24h: 90.0,
			timestamp: Utc::now(),
		};
		engine.on_ticker(ticker).await;

		let stats = engine.stats().await;
		assert_eq!(stats.total_alerts, 1);
		assert_eq!(stats.active_cooldowns, 1);
	}
}
