use crate::rest::BinanceRest;
use crate::types::{MarketType, OrderBook};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

const DEPTH_LEVELS: u32 = 20;
const MIN_INTERVAL_SECS: i64 = 30;
const POST_FETCH_SLEEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct DepthRequest {
	pub symbol: String,
	pub market: MarketType,
}

/// True when enough time has elapsed since `last_checked` (or there is no
/// prior record) to admit a fresh depth fetch for this symbol.
pub fn is_admitted(last_checked: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
	match last_checked {
		None => true,
		Some(t) => (now - t).num_seconds() >= MIN_INTERVAL_SECS,
	}
}

/// Single worker draining the bounded depth queue. Enforces the per-symbol
/// interval gate, REST-fetches the book on admission, and invokes `on_book`.
/// Always sleeps `POST_FETCH_SLEEP` after a fetch attempt (hit or miss) to
/// rate-limit the REST endpoint, and always advances `last_checked` even on
/// REST failure so a broken symbol can't be hammered.
pub async fn run_depth_worker<F>(
	rest: &BinanceRest,
	mut rx: mpsc::Receiver<DepthRequest>,
	mut shutdown: watch::Receiver<bool>,
	mut on_book: F,
) where
	F: FnMut(OrderBook),
{
	let mut last_checked: HashMap<(String, MarketType), DateTime<Utc>> = HashMap::new();

	loop {
		let request = tokio::select! {
			r = rx.recv() => match r {
				Some(r) => r,
				None => return,
			},
			_ = shutdown.changed() => return,
		};

		let now = Utc::now();
		let key = (request.symbol.clone(), request.market);

		if !is_admitted(last_checked.get(&key).copied(), now) {
			debug!(symbol = %request.symbol, "depth request skipped, within interval gate");
			continue;
		}

		match rest.fetch_depth(request.market, &request.symbol, DEPTH_LEVELS, now).await {
			Ok(book) => on_book(book),
			Err(e) => warn!(symbol = %request.symbol, error = %e, "depth REST fetch failed"),
		}
		last_checked.insert(key, now);

		tokio::time::sleep(POST_FETCH_SLEEP).await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeDelta;

	#[test]
	fn admits_first_request() {
		assert!(is_admitted(None, Utc::now()));
	}

	#[test]
	fn rejects_within_interval() {
		let now = Utc::now();
		let last = now - TimeDelta::seconds(10);
		assert!(!is_admitted(Some(last), now));
	}

	#[test]
	fn admits_after_interval_elapses() {
		let now = Utc::now();
		let last = now - TimeDelta::seconds(31);
		assert!(is_admitted(Some(last), now));
	}
}
