use thiserror::Error;

/// Transport/parse failures surfaced by the feed so callers can apply the
/// per-kind policy from the error handling design (reconnect vs. drop vs. log).
#[derive(Debug, Error)]
pub enum FeedError {
	#[error("transport error: {0}")]
	Transport(#[from] tokio_tungstenite::tungstenite::Error),

	#[error("rest error: {0}")]
	Rest(#[from] reqwest::Error),

	#[error("parse error: {0}")]
	Parse(String),
}
