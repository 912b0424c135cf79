use crate::types::{SpreadSnapshot, TickerSnapshot};
use std::cmp::Ordering;

/// Sorts by `key` descending, breaking ties by symbol ascending, and keeps
/// only rows meeting `min_volume`.
fn top_by<T>(rows: &[T], min_volume: f64, limit: usize, volume: impl Fn(&T) -> f64, key: impl Fn(&T) -> f64, symbol: impl Fn(&T) -> &str, ascending: bool) -> Vec<T>
where
	T: Clone,
{
	let mut filtered: Vec<&T> = rows.iter().filter(|r| volume(r) >= min_volume).collect();
	filtered.sort_by(|a, b| {
		let primary = if ascending { key(a).partial_cmp(&key(b)) } else { key(b).partial_cmp(&key(a)) }.unwrap_or(Ordering::Equal);
		primary.then_with(|| symbol(a).cmp(symbol(b)))
	});
	filtered.into_iter().take(limit).cloned().collect()
}

pub fn top_gainers(snapshots: &[TickerSnapshot], min_volume: f64, limit: usize) -> Vec<TickerSnapshot> {
	top_by(snapshots, min_volume, limit, |r| r.quote_volume, |r| r.change_percent, |r| &r.symbol, false)
}

pub fn top_losers(snapshots: &[TickerSnapshot], min_volume: f64, limit: usize) -> Vec<TickerSnapshot> {
	top_by(snapshots, min_volume, limit, |r| r.quote_volume, |r| r.change_percent, |r| &r.symbol, true)
}

pub fn top_volume(snapshots: &[TickerSnapshot], limit: usize) -> Vec<TickerSnapshot> {
	top_by(snapshots, 0.0, limit, |r| r.quote_volume, |r| r.quote_volume, |r| &r.symbol, false)
}

pub fn top_spreads(spreads: &[SpreadSnapshot], min_volume: f64, limit: usize) -> Vec<SpreadSnapshot> {
	top_by(spreads, min_volume, limit, |r| r.volume_24h_quote, |r| r.spread_percent.abs(), |r| &r.symbol, false)
}

pub fn top_funding_rates(snapshots: &[TickerSnapshot], ascending: bool, limit: usize) -> Vec<TickerSnapshot> {
	let with_funding: Vec<TickerSnapshot> = snapshots.iter().filter(|r| r.funding_rate_percent.is_some()).cloned().collect();
	top_by(&with_funding, 0.0, limit, |r| r.quote_volume, |r| r.funding_rate_percent.unwrap_or(0.0), |r| &r.symbol, ascending)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn snap(symbol: &str, change_percent: f64, quote_volume: f64) -> TickerSnapshot {
		TickerSnapshot { symbol: symbol.into(), change_percent, quote_volume, ..Default::default() }
	}

	#[test]
	fn gainers_sorted_descending_with_symbol_tiebreak() {
		let rows = vec![snap("AUSDT", 5.0, 1_000_000.0), snap("BUSDT", 5.0, 1_000_000.0), snap("CUSDT", 10.0, 1_000_000.0)];
		let top = top_gainers(&rows, 0.0, 10);
		assert_eq!(top[0].symbol, "CUSDT");
		assert_eq!(top[1].symbol, "AUSDT");
		assert_eq!(top[2].symbol, "BUSDT");
	}

	#[test]
	fn losers_filtered_by_min_volume() {
		let rows = vec![snap("AUSDT", -20.0, 100.0), snap("BUSDT", -5.0, 1_000_000.0)];
		let top = top_losers(&rows, 1000.0, 10);
		assert_eq!(top.len(), 1);
		assert_eq!(top[0].symbol, "BUSDT");
	}

	#[test]
	fn limit_truncates_results() {
		let rows = vec![snap("AUSDT", 1.0, 1.0), snap("BUSDT", 2.0, 1.0), snap("CUSDT", 3.0, 1.0)];
		assert_eq!(top_volume(&rows, 2).len(), 2);
	}
}
