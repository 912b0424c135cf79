use crate::cooldown::{CooldownTable, Decision};
use crate::ids::IdGen;
use crate::levels::{classify_big_order, classify_funding, classify_price_change, classify_spread, classify_volume_ratio};
use crate::types::{
	Alert, AlertPayload, AlertType, BigOrderPayload, FundingPayload, Horizon, PricePayload, SpreadPayload, VolumePayload,
};
use chrono::{DateTime, Utc};
use market_feed::{MarketType, OrderBook, Spread, Ticker};
use std::cmp::Ordering;
use user_config::UserConfig;

fn market_enabled(user: &UserConfig, market: MarketType) -> bool {
	match market {
		MarketType::Spot => user.enable_spot,
		MarketType::Futures => user.enable_futures,
	}
}

#[must_use]
pub fn admits_ticker(user: &UserConfig, ticker: &Ticker) -> bool {
	user.is_active && user.should_monitor(&ticker.symbol) && market_enabled(user, ticker.market) && user.should_monitor_by_volume(ticker.volume_24h_quote)
}

fn fire(cooldowns: &mut CooldownTable, user_id: u64, symbol: &str, alert_type: AlertType, level: crate::types::AlertLevel, cooldown_seconds: u64, now: DateTime<Utc>) -> Option<bool> {
	match cooldowns.check(user_id, symbol, alert_type, level, cooldown_seconds, now) {
		Decision::Fire => Some(false),
		Decision::FireEscalation => Some(true),
		Decision::Suppress => None,
	}
}

/// All four price-change horizons for one side (pump or dump), picking the
/// one with the highest classified level; ties broken by larger absolute
/// magnitude, then by the shorter (more urgent) horizon.
fn pick_breach(candidates: Vec<(f64, Horizon)>) -> Option<(f64, Horizon, crate::types::AlertLevel)> {
	candidates
		.into_iter()
		.map(|(change, horizon)| (change, horizon, classify_price_change(change)))
		.max_by(|a, b| {
			a.2.cmp(&b.2)
				.then_with(|| a.0.abs().partial_cmp(&b.0.abs()).unwrap_or(Ordering::Equal))
				.then_with(|| b.1.urgency_rank().cmp(&a.1.urgency_rank()))
		})
}

/// Ticker evaluation for one user: pump, dump, and volume-spike checks,
/// each independently cooldown-gated. Returns the alerts that should fire.
#[must_use]
pub fn evaluate_ticker(user: &UserConfig, ticker: &Ticker, cooldowns: &mut CooldownTable, ids: &IdGen, now: DateTime<Utc>) -> Vec<Alert> {
	let mut alerts = Vec::new();
	let price = &user.price;

	let horizons: [(Option<f64>, f64, f64, Horizon); 4] = [
		(ticker.change_1m, price.pump_1m, price.dump_1m, Horizon::M1),
		(ticker.change_5m, price.pump_5m, price.dump_5m, Horizon::M5),
		(ticker.change_15m, price.pump_15m, price.dump_15m, Horizon::M15),
		(ticker.change_1h, price.pump_1h, price.dump_1h, Horizon::H1),
	];

	let pump_candidates: Vec<(f64, Horizon)> = horizons.iter().filter_map(|(c, pump, _, h)| c.filter(|c| *c >= *pump).map(|c| (c, *h))).collect();
	let dump_candidates: Vec<(f64, Horizon)> = horizons.iter().filter_map(|(c, _, dump, h)| c.filter(|c| *c <= *dump).map(|c| (c, *h))).collect();

	if let Some((change, horizon, level)) = pick_breach(pump_candidates) {
		if let Some(is_escalation) = fire(cooldowns, user.user_id, &ticker.symbol, AlertType::PricePump, level, user.cooldown_seconds, now) {
			alerts.push(build_price_alert(ticker, user.user_id, AlertType::PricePump, change, horizon, level, is_escalation, ids, now));
		}
	}

	if let Some((change, horizon, level)) = pick_breach(dump_candidates) {
		if let Some(is_escalation) = fire(cooldowns, user.user_id, &ticker.symbol, AlertType::PriceDump, level, user.cooldown_seconds, now) {
			alerts.push(build_price_alert(ticker, user.user_id, AlertType::PriceDump, change, horizon, level, is_escalation, ids, now));
		}
	}

	if user.enable_volume && ticker.volume_change_ratio >= user.volume.spike_ratio {
		let level = classify_volume_ratio(ticker.volume_change_ratio);
		if let Some(is_escalation) = fire(cooldowns, user.user_id, &ticker.symbol, AlertType::VolumeSpike, level, user.cooldown_seconds, now) {
			alerts.push(build_volume_alert(ticker, user.user_id, level, is_escalation, ids, now));
		}
	}

	alerts
}

fn build_price_alert(ticker: &Ticker, user_id: u64, alert_type: AlertType, change: f64, horizon: Horizon, level: crate::types::AlertLevel, is_escalation: bool, ids: &IdGen, now: DateTime<Utc>) -> Alert {
	let direction = if alert_type == AlertType::PricePump { "pump" } else { "dump" };
	let escalation_prefix = if is_escalation { "escalation: " } else { "" };
	let message = format!("{escalation_prefix}{} {direction} {change:+.2}% over {}", ticker.symbol, horizon.label());

	let payload = AlertPayload::Price(PricePayload {
		price: ticker.price,
		change_percent: change,
		horizon,
		high_24h: ticker.high_24h,
		low_24h: ticker.low_24h,
		volume_24h_quote: ticker.volume_24h_quote,
		change_24h: ticker.change_24h,
	});

	Alert::new(ids.next(), alert_type, level, ticker.symbol.clone(), ticker.market, message, payload, user_id, is_escalation, now)
}

fn build_volume_alert(ticker: &Ticker, user_id: u64, level: crate::types::AlertLevel, is_escalation: bool, ids: &IdGen, now: DateTime<Utc>) -> Alert {
	let escalation_prefix = if is_escalation { "escalation: " } else { "" };
	let message = format!("{escalation_prefix}{} volume spike {:.1}x", ticker.symbol, ticker.volume_change_ratio);

	let payload = AlertPayload::Volume(VolumePayload {
		price: ticker.price,
		volume_ratio: ticker.volume_change_ratio,
		high_24h: ticker.high_24h,
		low_24h: ticker.low_24h,
		volume_24h_quote: ticker.volume_24h_quote,
		change_24h: ticker.change_24h,
	});

	Alert::new(ids.next(), AlertType::VolumeSpike, level, ticker.symbol.clone(), ticker.market, message, payload, user_id, is_escalation, now)
}

#[must_use]
pub fn admits_spread(user: &UserConfig, symbol: &str, volume_24h_quote: f64) -> bool {
	user.is_active && user.should_monitor(symbol) && user.should_monitor_by_volume(volume_24h_quote)
}

/// Spread (spot-vs-futures basis) and, independently, funding-rate
/// evaluation for one user against one `Spread` event.
#[must_use]
pub fn evaluate_spread(user: &UserConfig, spread: &Spread, volume_24h_quote: f64, cooldowns: &mut CooldownTable, ids: &IdGen, now: DateTime<Utc>) -> Vec<Alert> {
	let mut alerts = Vec::new();

	if user.enable_spread && spread.spread_percent.abs() >= user.spread.spot_futures_percent {
		let alert_type = if spread.spread_percent > 0.0 { AlertType::SpreadHigh } else { AlertType::SpreadLow };
		let level = classify_spread(spread.spread_percent);
		if let Some(is_escalation) = fire(cooldowns, user.user_id, &spread.symbol, alert_type, level, user.cooldown_seconds, now) {
			alerts.push(build_spread_alert(spread, user.user_id, alert_type, level, is_escalation, volume_24h_quote, ids, now));
		}
	}

	if user.enable_funding {
		let rate = spread.funding_rate_percent;
		if rate >= user.spread.funding_high_percent {
			let level = classify_funding(rate);
			if let Some(is_escalation) = fire(cooldowns, user.user_id, &spread.symbol, AlertType::FundingHigh, level, user.cooldown_seconds, now) {
				alerts.push(build_funding_alert(spread, user.user_id, AlertType::FundingHigh, level, is_escalation, volume_24h_quote, ids, now));
			}
		} else if rate <= user.spread.funding_low_percent {
			let level = classify_funding(rate);
			if let Some(is_escalation) = fire(cooldowns, user.user_id, &spread.symbol, AlertType::FundingLow, level, user.cooldown_seconds, now) {
				alerts.push(build_funding_alert(spread, user.user_id, AlertType::FundingLow, level, is_escalation, volume_24h_quote, ids, now));
			}
		}
	}

	alerts
}

fn build_spread_alert(spread: &Spread, user_id: u64, alert_type: AlertType, level: crate::types::AlertLevel, is_escalation: bool, volume_24h_quote: f64, ids: &IdGen, now: DateTime<Utc>) -> Alert {
	let escalation_prefix = if is_escalation { "escalation: " } else { "" };
	let message = if alert_type == AlertType::SpreadHigh {
		format!("{escalation_prefix}{} futures premium {:+.2}%", spread.symbol, spread.spread_percent)
	} else {
		format!("{escalation_prefix}{} spot premium {:.2}%", spread.symbol, spread.spread_percent.abs())
	};

	let payload = AlertPayload::Spread(SpreadPayload {
		spot_price: spread.spot_price,
		futures_price: spread.futures_price,
		spread_percent: spread.spread_percent,
		funding_rate_percent: spread.funding_rate_percent,
		high_24h: 0.0,
		low_24h: 0.0,
		volume_24h_quote,
		change_24h: 0.0,
	});

	Alert::new(ids.next(), alert_type, level, spread.symbol.clone(), MarketType::Futures, message, payload, user_id, is_escalation, now)
}

fn build_funding_alert(spread: &Spread, user_id: u64, alert_type: AlertType, level: crate::types::AlertLevel, is_escalation: bool, volume_24h_quote: f64, ids: &IdGen, now: DateTime<Utc>) -> Alert {
	let escalation_prefix = if is_escalation { "escalation: " } else { "" };
	let label = if alert_type == AlertType::FundingHigh { "high" } else { "low" };
	let message = format!("{escalation_prefix}{} funding rate {label} {:.4}%", spread.symbol, spread.funding_rate_percent);

	let payload = AlertPayload::Funding(FundingPayload {
		spot_price: spread.spot_price,
		futures_price: spread.futures_price,
		spread_percent: spread.spread_percent,
		funding_rate_percent: spread.funding_rate_percent,
		high_24h: 0.0,
		low_24h: 0.0,
		volume_24h_quote,
		change_24h: 0.0,
	});

	Alert::new(ids.next(), alert_type, level, spread.symbol.clone(), MarketType::Futures, message, payload, user_id, is_escalation, now)
}

#[must_use]
pub fn admits_order_book(user: &UserConfig, book: &OrderBook, volume_24h_quote: f64) -> bool {
	user.is_active && user.enable_big_order && user.should_monitor(&book.symbol) && market_enabled(user, book.market) && user.should_monitor_by_volume(volume_24h_quote)
}

/// Order-book evaluation for one user: each side independently tested
/// against the tiered big-order threshold, gated by price deviation from
/// the live price.
#[must_use]
pub fn evaluate_order_book(user: &UserConfig, book: &OrderBook, current_price: f64, volume_24h_quote: f64, cooldowns: &mut CooldownTable, ids: &IdGen, now: DateTime<Utc>) -> Vec<Alert> {
	let mut alerts = Vec::new();
	if current_price <= 0.0 {
		return alerts;
	}

	let big_order = &user.big_order;
	if !big_order.enabled {
		return alerts;
	}

	if book.max_bid_order_value > 0.0 && big_order.is_big_order(book.max_bid_order_value, volume_24h_quote) {
		let price_diff = (current_price - book.max_bid_price) / current_price * 100.0;
		if price_diff.abs() <= big_order.max_price_deviation_percent {
			let level = classify_big_order(book.max_bid_order_value, volume_24h_quote);
			if let Some(is_escalation) = fire(cooldowns, user.user_id, &book.symbol, AlertType::BigBidOrder, level, user.cooldown_seconds, now) {
				alerts.push(build_big_order_alert(book, user.user_id, AlertType::BigBidOrder, book.max_bid_order_value, book.max_bid_price, current_price, price_diff, volume_24h_quote, level, is_escalation, ids, now));
			}
		}
	}

	if book.max_ask_order_value > 0.0 && big_order.is_big_order(book.max_ask_order_value, volume_24h_quote) {
		let price_diff = (book.max_ask_price - current_price) / current_price * 100.0;
		if price_diff.abs() <= big_order.max_price_deviation_percent {
			let level = classify_big_order(book.max_ask_order_value, volume_24h_quote);
			if let Some(is_escalation) = fire(cooldowns, user.user_id, &book.symbol, AlertType::BigAskOrder, level, user.cooldown_seconds, now) {
				alerts.push(build_big_order_alert(book, user.user_id, AlertType::BigAskOrder, book.max_ask_order_value, book.max_ask_price, current_price, price_diff, volume_24h_quote, level, is_escalation, ids, now));
			}
		}
	}

	alerts
}

#[allow(clippy::too_many_arguments)]
fn build_big_order_alert(
	book: &OrderBook,
	user_id: u64,
	alert_type: AlertType,
	order_value: f64,
	order_price: f64,
	current_price: f64,
	price_diff_percent: f64,
	volume_24h_quote: f64,
	level: crate::types::AlertLevel,
	is_escalation: bool,
	ids: &IdGen,
	now: DateTime<Utc>,
) -> Alert {
	let escalation_prefix = if is_escalation { "escalation: " } else { "" };
	let side = if alert_type == AlertType::BigBidOrder { "bid" } else { "ask" };
	let value_str = format_notional(order_value);
	let message = format!("{escalation_prefix}{} big {side} order {value_str}", book.symbol);

	let payload = AlertPayload::BigOrder(BigOrderPayload {
		current_price,
		order_value,
		order_price,
		price_diff_percent,
		bid_ask_ratio: book.bid_ask_ratio,
		total_bid_value: book.total_bid_value,
		total_ask_value: book.total_ask_value,
		volume_24h_quote,
	});

	Alert::new(ids.next(), alert_type, level, book.symbol.clone(), book.market, message, payload, user_id, is_escalation, now)
}

fn format_notional(value: f64) -> String {
	if value >= 1_000_000.0 {
		format!("${:.2}M", value / 1_000_000.0)
	} else if value >= 1_000.0 {
		format!("${:.1}K", value / 1_000.0)
	} else {
		format!("${value:.0}")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ticker(symbol: &str, change_1m: Option<f64>, change_5m: Option<f64>) -> Ticker {
		Ticker {
			symbol: symbol.into(),
			market: MarketType::Spot,
			price: 100.0,
			change_1m,
			change_5m,
			change_15m: None,
			change_1h: None,
			change_24h: 0.0,
			volume_24h_quote: 1_000_000.0,
			volume_change_ratio: 1.0,
			high_24h: 110.0,
			low_24h: 90.0,
			timestamp: Utc::now(),
		}
	}

	#[test]
	fn pump_fires_on_threshold_breach() {
		let user = UserConfig { user_id: 1, ..Default::default() };
		let mut cooldowns = CooldownTable::new();
		let ids = IdGen::new();
		let t = ticker("BTCUSDT", Some(7.0), None);

		let alerts = evaluate_ticker(&user, &t, &mut cooldowns, &ids, Utc::now());
		assert_eq!(alerts.len(), 1);
		assert_eq!(alerts[0].alert_type, AlertType::PricePump);
	}

	#[test]
	fn pick_breach_prefers_shorter_horizon_on_tie() {
		let candidates = vec![(6.0, Horizon::M1), (6.0, Horizon::M5)];
		let (_, horizon, _) = pick_breach(candidates).unwrap();
		assert_eq!(horizon, Horizon::M1);
	}

	#[test]
	fn admits_ticker_respects_volume_gate() {
		let mut user = UserConfig { user_id: 1, ..Default::default() };
		user.volume_filter_enabled = true;
		user.min_volume_24h = 2_000_000.0;
		let t = ticker("BTCUSDT", Some(7.0), None);
		assert!(!admits_ticker(&user, &t));
	}

	#[test]
	fn big_order_respects_price_deviation_gate() {
		let user = UserConfig { user_id: 1, ..Default::default() };
		let mut cooldowns = CooldownTable::new();
		let ids = IdGen::new();

		let book = OrderBook::new(
			"BTCUSDT".into(),
			MarketType::Spot,
			vec![market_feed::OrderBookLevel { price: 50.0, quantity: 1000.0 }],
			vec![],
			Utc::now(),
		);

		// current_price 100, bid at 50 -> 50% deviation, above default 5% max.
		let alerts = evaluate_order_book(&user, &book, 100.0, 1_000_000.0, &mut cooldowns, &ids, Utc::now());
		assert!(alerts.is_empty());
	}
}
