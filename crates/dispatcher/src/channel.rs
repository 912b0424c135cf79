use crate::types::{ChannelError, SendOutcome};
use alert_engine::Alert;
use async_trait::async_trait;
use user_config::UserConfig;

/// One outbound notification surface. `prefix` carries rendering context the
/// dispatcher computes once per send attempt (night-mode marker, repeat
/// counter) rather than the channel reaching back into dispatcher state.
#[async_trait]
pub trait Channel: Send + Sync {
	fn name(&self) -> &'static str;
	async fn send(&self, alert: &Alert, user: &UserConfig, prefix: &str, show_confirm_button: bool, show_mute_buttons: bool) -> Result<SendOutcome, ChannelError>;

	/// Plain-text out-of-band notifications (mute restore). Channels that
	/// have no notion of an unstructured message no-op as `NotConfigured`.
	async fn send_text(&self, _user: &UserConfig, _text: &str) -> Result<SendOutcome, ChannelError> {
		Err(ChannelError::NotConfigured)
	}
}

/// Retries transient failures up to 3 times with a 1s pause; a timeout is
/// treated as probable success (no retry, to avoid duplicate sends);
/// permission-denied is returned immediately so the caller can deactivate
/// the user.
pub async fn send_with_retry(channel: &dyn Channel, alert: &Alert, user: &UserConfig, prefix: &str, show_confirm_button: bool, show_mute_buttons: bool) -> Result<SendOutcome, ChannelError> {
	let mut attempt = 0;
	loop {
		match channel.send(alert, user, prefix, show_confirm_button, show_mute_buttons).await {
			Ok(outcome) => return Ok(outcome),
			Err(ChannelError::Timeout) => return Ok(SendOutcome::ProbablySent),
			Err(ChannelError::PermissionDenied) => return Err(ChannelError::PermissionDenied),
			Err(ChannelError::NotConfigured) => return Err(ChannelError::NotConfigured),
			Err(e @ ChannelError::Transient(_)) => {
				attempt += 1;
				if attempt >= 3 {
					return Err(e);
				}
				tokio::time::sleep(std::time::Duration::from_secs(1)).await;
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alert_engine::{AlertLevel, AlertPayload, AlertType, Horizon, PricePayload};
	use chrono::Utc;
	use market_feed::MarketType;
	use std::sync::atomic::{AtomicU32, Ordering};

	struct FlakyChannel {
		fail_times: u32,
		attempts: AtomicU32,
	}

	#[async_trait]
	impl Channel for FlakyChannel {
		fn name(&self) -> &'static str {
			"flaky"
		}
		async fn send(&self, _alert: &Alert, _user: &UserConfig, _prefix: &str, _c: bool, _m: bool) -> Result<SendOutcome, ChannelError> {
			let n = self.attempts.fetch_add(1, Ordering::Relaxed);
			if n < self.fail_times {
				Err(ChannelError::Transient("connection reset".into()))
			} else {
				Ok(SendOutcome::Sent)
			}
		}
	}

	fn sample_alert() -> Alert {
		Alert::new(
			"a1".into(),
			AlertType::PricePump,
			AlertLevel::Warning,
			"BTCUSDT",
			MarketType::Spot,
			"pumped",
			AlertPayload::Price(PricePayload { price: 1.0, change_percent: 1.0, horizon: Horizon::M1, high_24h: 1.0, low_24h: 1.0, volume_24h_quote: 1.0, change_24h: 1.0 }),
			7,
			false,
			Utc::now(),
		)
	}

	#[tokio::test(start_paused = true)]
	async fn retries_transient_failures_until_success() {
		let channel = FlakyChannel { fail_times: 2, attempts: AtomicU32::new(0) };
		let user = UserConfig::default();
		let result = send_with_retry(&channel, &sample_alert(), &user, "", false, false).await;
		assert_eq!(result.unwrap(), SendOutcome::Sent);
		assert_eq!(channel.attempts.load(Ordering::Relaxed), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn gives_up_after_three_transient_failures() {
		let channel = FlakyChannel { fail_times: u32::MAX, attempts: AtomicU32::new(0) };
		let user = UserConfig::default();
		let result = send_with_retry(&channel, &sample_alert(), &user, "", false, false).await;
		assert!(matches!(result, Err(ChannelError::Transient(_))));
		assert_eq!(channel.attempts.load(Ordering::Relaxed), 3);
	}

	#[tokio::test]
	async fn timeout_is_treated_as_probable_success() {
		struct TimeoutChannel;
		#[async_trait]
		impl Channel for TimeoutChannel {
			fn name(&self) -> &'static str {
				"timeout"
			}
			async fn send(&self, _alert: &Alert, _user: &UserConfig, _prefix: &str, _c: bool, _m: bool) -> Result<SendOutcome, ChannelError> {
				Err(ChannelError::Timeout)
			}
		}
		let user = UserConfig::default();
		let result = send_with_retry(&TimeoutChannel, &sample_alert(), &user, "", false, false).await;
		assert_eq!(result.unwrap(), SendOutcome::ProbablySent);
	}
}
