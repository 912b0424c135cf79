use crate::channel::Channel;
use crate::types::{ChannelError, SendOutcome};
use alert_engine::{Alert, AlertLevel, AlertPayload, AlertType};
use async_trait::async_trait;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};
use tracing::{error, info};
use user_config::UserConfig;

pub struct TelegramChannel {
	bot: Bot,
}

impl TelegramChannel {
	#[must_use]
	pub fn new(bot_token: &str) -> Self {
		Self { bot: Bot::new(bot_token) }
	}

	/// Shares the underlying bot handle (cheap to clone) with the inline
	/// callback-query listener, rather than constructing a second client for
	/// the same token.
	#[must_use]
	pub fn bot(&self) -> Bot {
		self.bot.clone()
	}
}

fn level_emoji(level: AlertLevel) -> &'static str {
	match level {
		AlertLevel::Info => "ℹ️",
		AlertLevel::Warning => "⚠️",
		AlertLevel::Critical => "🔥",
		AlertLevel::Extreme => "🚨",
	}
}

fn type_label(alert_type: AlertType) -> &'static str {
	match alert_type {
		AlertType::PricePump => "PRICE PUMP",
		AlertType::PriceDump => "PRICE DUMP",
		AlertType::VolumeSpike => "VOLUME SPIKE",
		AlertType::SpreadHigh => "SPREAD HIGH",
		AlertType::SpreadLow => "SPREAD LOW",
		AlertType::FundingHigh => "FUNDING HIGH",
		AlertType::FundingLow => "FUNDING LOW",
		AlertType::BigBidOrder => "BIG BID ORDER",
		AlertType::BigAskOrder => "BIG ASK ORDER",
	}
}

/// A 10-cell text bar showing where a resting big order sits relative to
/// the current price, filled from the side the order rests on.
fn position_bar(price_diff_percent: f64, max_deviation: f64) -> String {
	let filled = if max_deviation <= 0.0 {
		0
	} else {
		((price_diff_percent.abs() / max_deviation) * 10.0).round().clamp(0.0, 10.0) as usize
	};
	let (fill_char, rest_char) = if price_diff_percent >= 0.0 { ('▲', '·') } else { ('▼', '·') };
	let bar: String = (0..10).map(|i| if i < filled { fill_char } else { rest_char }).collect();
	format!("[{bar}]")
}

fn render_body(alert: &Alert, prefix: &str) -> String {
	let mut lines = vec![format!("{} <b>{}{}</b> — {}", level_emoji(alert.level), prefix, type_label(alert.alert_type), alert.symbol)];
	lines.push(alert.message.clone());

	if let AlertPayload::BigOrder(p) = &alert.payload {
		lines.push(format!("{} (order @ {:.4}, price {:.4})", position_bar(p.price_diff_percent, 5.0), p.order_price, p.current_price));
	}

	if alert.is_escalation {
		lines.push("<i>escalated from a prior alert</i>".to_string());
	}

	lines.join("\n")
}

fn keyboard(alert_id: &str, show_confirm: bool, show_mute: bool) -> Option<InlineKeyboardMarkup> {
	if !show_confirm && !show_mute {
		return None;
	}
	let mut rows = Vec::new();
	if show_confirm {
		rows.push(vec![InlineKeyboardButton::callback("Confirm", format!("confirm:{alert_id}"))]);
	}
	if show_mute {
		rows.push(vec![
			InlineKeyboardButton::callback("Mute 1h", format!("mute:{alert_id}:60")),
			InlineKeyboardButton::callback("Mute 24h", format!("mute:{alert_id}:1440")),
		]);
	}
	Some(InlineKeyboardMarkup::new(rows))
}

#[async_trait]
impl Channel for TelegramChannel {
	fn name(&self) -> &'static str {
		"telegram"
	}

	async fn send(&self, alert: &Alert, user: &UserConfig, prefix: &str, show_confirm_button: bool, show_mute_buttons: bool) -> Result<SendOutcome, ChannelError> {
		if user.chat_id == 0 {
			return Err(ChannelError::NotConfigured);
		}

		let body = render_body(alert, prefix);
		let mut request = self.bot.send_message(ChatId(user.chat_id), body).parse_mode(ParseMode::Html);
		if let Some(markup) = keyboard(&alert.id, show_confirm_button, show_mute_buttons) {
			request = request.reply_markup(markup);
		}

		match request.await {
			Ok(_) => {
				info!(user_id = user.user_id, symbol = %alert.symbol, "alert sent via telegram");
				Ok(SendOutcome::Sent)
			},
			Err(teloxide::RequestError::Api(teloxide::ApiError::Unknown(msg))) if msg.to_lowercase().contains("blocked") => {
				Err(ChannelError::PermissionDenied)
			},
			Err(teloxide::RequestError::Api(teloxide::ApiError::BotBlocked)) => Err(ChannelError::PermissionDenied),
			Err(teloxide::RequestError::Network(e)) if e.is_timeout() => Err(ChannelError::Timeout),
			Err(e) => {
				error!(user_id = user.user_id, error = %e, "telegram send failed");
				Err(ChannelError::Transient(e.to_string()))
			},
		}
	}

	async fn send_text(&self, user: &UserConfig, text: &str) -> Result<SendOutcome, ChannelError> {
		if user.chat_id == 0 {
			return Err(ChannelError::NotConfigured);
		}
		match self.bot.send_message(ChatId(user.chat_id), text).await {
			Ok(_) => Ok(SendOutcome::Sent),
			Err(teloxide::RequestError::Network(e)) if e.is_timeout() => Err(ChannelError::Timeout),
			Err(e) => Err(ChannelError::Transient(e.to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bar_fills_proportionally_to_deviation() {
		assert_eq!(position_bar(2.5, 5.0), "[▲▲▲▲▲·····]");
		assert_eq!(position_bar(-5.0, 5.0), "[▼▼▼▼▼▼▼▼▼▼]");
		assert_eq!(position_bar(0.0, 5.0), "[··········]");
	}

	#[test]
	fn type_label_covers_big_order_variants() {
		assert_eq!(type_label(AlertType::BigBidOrder), "BIG BID ORDER");
		assert_eq!(type_label(AlertType::BigAskOrder), "BIG ASK ORDER");
	}
}
