use crate::types::RawTick;
use futures_util::{stream, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Binance multiplexes up to ~200 streams per connection; chunk at that bound
/// so a single market's symbol universe can span several connections.
pub const MAX_STREAMS_PER_CONNECTION: usize = 200;

const BACKOFF_INITIAL_SECS: f64 = 5.0;
const BACKOFF_MULTIPLIER: f64 = 1.5;
const BACKOFF_MAX_SECS: f64 = 60.0;

/// Runs one market's streaming session until `shutdown` fires, reconnecting
/// with exponential backoff on every transport error. Parsed ticks are pushed
/// onto `tx`; the caller (coalescer) owns batching them.
pub async fn run_stream_session(
	market_label: &str,
	ws_base_url: &str,
	symbols: Vec<String>,
	tx: mpsc::UnboundedSender<RawTick>,
	mut shutdown: watch::Receiver<bool>,
) {
	if symbols.is_empty() {
		warn!(market = market_label, "no symbols to stream, session idle");
		return;
	}

	let mut backoff_secs = BACKOFF_INITIAL_SECS;

	loop {
		if *shutdown.borrow() {
			return;
		}

		match connect_and_read(ws_base_url, &symbols, &tx, &mut shutdown).await {
			Ok(()) => {
				info!(market = market_label, "stream session ended cleanly");
				if *shutdown.borrow() {
					return;
				}
				backoff_secs = BACKOFF_INITIAL_SECS;
			},
			Err(e) => {
				warn!(market = market_label, error = %e, delay = backoff_secs, "stream disconnected, reconnecting");
			},
		}

		if *shutdown.borrow() {
			return;
		}

		tokio::select! {
			() = tokio::time::sleep(Duration::from_secs_f64(backoff_secs)) => {},
			_ = shutdown.changed() => return,
		}
		backoff_secs = (backoff_secs * BACKOFF_MULTIPLIER).min(BACKOFF_MAX_SECS);
	}
}

async fn connect_and_read(
	ws_base_url: &str,
	symbols: &[String],
	tx: &mpsc::UnboundedSender<RawTick>,
	shutdown: &mut watch::Receiver<bool>,
) -> anyhow::Result<()> {
	let chunks: Vec<_> = symbols.chunks(MAX_STREAMS_PER_CONNECTION).collect();
	let mut connections = Vec::new();

	for chunk in &chunks {
		let stream_names: Vec<String> = chunk.iter().map(|s| format!("{}@miniTicker", s.to_lowercase())).collect();
		let url = format!("{ws_base_url}/stream?streams={}", stream_names.join("/"));
		let (ws, _response) = connect_async(&url).await?;
		let (_write, read) = ws.split();
		connections.push(read);
	}

	let mut merged = if connections.len() == 1 {
		Box::pin(connections.remove(0)) as std::pin::Pin<Box<dyn futures_util::Stream<Item = _> + Send>>
	} else {
		Box::pin(stream::select_all(connections))
	};

	loop {
		tokio::select! {
			maybe_msg = merged.next() => {
				match maybe_msg {
					Some(Ok(Message::Text(text))) => {
						if let Some(tick) = parse_mini_ticker(&text) {
							if tx.send(tick).is_err() {
								return Ok(());
							}
						}
					},
					Some(Ok(Message::Close(_))) | None => return Ok(()),
					Some(Ok(_)) => {},
					Some(Err(e)) => return Err(e.into()),
				}
			},
			_ = shutdown.changed() => return Ok(()),
		}
	}
}

/// Unwraps `{"stream": "...", "data": {...}}` multiplexed frames and extracts
/// the `{s, c, v, h, l}` fields the feed needs.
fn parse_mini_ticker(text: &str) -> Option<RawTick> {
	let json: Value = match serde_json::from_str(text) {
		Ok(v) => v,
		Err(e) => {
			debug!(error = %e, "dropping unparsable stream frame");
			return None;
		},
	};
	let data = json.get("data")?;

	let symbol = data.get("s")?.as_str()?.to_string();
	let close = parse_num(data.get("c")?)?;
	let volume = data.get("v").and_then(parse_num).unwrap_or(0.0);
	let high = data.get("h").and_then(parse_num).unwrap_or(close);
	let low = data.get("l").and_then(parse_num).unwrap_or(close);

	Some(RawTick { symbol, close, volume, high, low })
}

fn parse_num(v: &Value) -> Option<f64> {
	v.as_str().and_then(|s| s.parse().ok()).or_else(|| v.as_f64())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_wrapped_minitickers_frame() {
		let frame = r#"{"stream":"btcusdt@miniTicker","data":{"e":"24hrMiniTicker","s":"BTCUSDT","c":"50000.00","v":"1234.5","h":"51000.00","l":"49000.00"}}"#;
		let tick = parse_mini_ticker(frame).expect("parses");
		assert_eq!(tick.symbol, "BTCUSDT");
		assert!((tick.close - 50000.0).abs() < 1e-9);
		assert!((tick.volume - 1234.5).abs() < 1e-9);
	}

	#[test]
	fn ignores_frames_without_data_wrapper() {
		assert!(parse_mini_ticker(r#"{"result":null,"id":1}"#).is_none());
	}

	#[test]
	fn ignores_garbage() {
		assert!(parse_mini_ticker("not json").is_none());
	}
}
