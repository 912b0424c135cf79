use crate::types::RawTick;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::debug;

const BATCH_MAX_ENTRIES: usize = 50;
const BATCH_TIMEOUT: Duration = Duration::from_millis(100);

/// Drains `rx` into a map keyed by symbol until either the map reaches
/// `BATCH_MAX_ENTRIES` or the drain times out at `BATCH_TIMEOUT`; only the
/// latest update per symbol within the batch survives. Each survivor is
/// handed to `on_batch` in one call so a single evaluation pass covers the
/// whole batch (coalescing idempotence: exactly one evaluation per symbol).
pub async fn run_coalescer<F>(mut rx: mpsc::UnboundedReceiver<RawTick>, mut shutdown: watch::Receiver<bool>, mut on_batch: F)
where
	F: FnMut(Vec<RawTick>),
{
	loop {
		if *shutdown.borrow() {
			return;
		}

		let mut batch: HashMap<String, RawTick> = HashMap::new();
		let deadline = tokio::time::Instant::now() + BATCH_TIMEOUT;

		loop {
			let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
			tokio::select! {
				maybe_tick = timeout(remaining, rx.recv()) => {
					match maybe_tick {
						Ok(Some(tick)) => {
							batch.insert(tick.symbol.clone(), tick);
							if batch.len() >= BATCH_MAX_ENTRIES {
								break;
							}
						},
						Ok(None) => {
							if !batch.is_empty() {
								on_batch(batch.into_values().collect());
							}
							return;
						},
						Err(_elapsed) => break,
					}
				},
				_ = shutdown.changed() => {
					if !batch.is_empty() {
						on_batch(batch.into_values().collect());
					}
					return;
				}
			}
		}

		if !batch.is_empty() {
			debug!(count = batch.len(), "coalesced batch ready");
			on_batch(batch.into_values().collect());
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn coalesces_duplicate_symbols_to_last_writer() {
		let (tx, rx) = mpsc::unbounded_channel();
		let (shutdown_tx, shutdown_rx) = watch::channel(false);

		tx.send(RawTick { symbol: "XUSDT".into(), close: 1.0, volume: 1.0, high: 1.0, low: 1.0 }).unwrap();
		tx.send(RawTick { symbol: "XUSDT".into(), close: 1.05, volume: 1.0, high: 1.05, low: 1.0 }).unwrap();
		tx.send(RawTick { symbol: "XUSDT".into(), close: 1.10, volume: 1.0, high: 1.10, low: 1.0 }).unwrap();
		drop(tx);

		let mut batches = Vec::new();
		run_coalescer(rx, shutdown_rx, |batch| batches.push(batch)).await;
		let _ = shutdown_tx;

		assert_eq!(batches.len(), 1);
		assert_eq!(batches[0].len(), 1);
		assert!((batches[0][0].close - 1.10).abs() < 1e-9);
	}

	#[tokio::test]
	async fn distinct_symbols_all_survive_one_batch() {
		let (tx, rx) = mpsc::unbounded_channel();
		let (_shutdown_tx, shutdown_rx) = watch::channel(false);

		tx.send(RawTick { symbol: "AUSDT".into(), close: 1.0, volume: 1.0, high: 1.0, low: 1.0 }).unwrap();
		tx.send(RawTick { symbol: "BUSDT".into(), close: 2.0, volume: 1.0, high: 2.0, low: 2.0 }).unwrap();
		drop(tx);

		let mut batches = Vec::new();
		run_coalescer(rx, shutdown_rx, |batch| batches.push(batch)).await;

		assert_eq!(batches.len(), 1);
		assert_eq!(batches[0].len(), 2);
	}
}
