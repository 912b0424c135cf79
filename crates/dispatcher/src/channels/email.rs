use crate::channel::Channel;
use crate::types::{ChannelError, SendOutcome};
use alert_engine::Alert;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{error, info};
use user_config::UserConfig;

#[derive(Debug, Clone)]
pub struct SmtpSettings {
	pub host: String,
	pub username: String,
	pub password: String,
	pub from_address: String,
}

pub struct EmailChannel {
	transport: AsyncSmtpTransport<Tokio1Executor>,
	from_address: String,
}

impl EmailChannel {
	pub fn new(settings: &SmtpSettings) -> anyhow::Result<Self> {
		let creds = Credentials::new(settings.username.clone(), settings.password.clone());
		let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?.credentials(creds).build();
		Ok(Self { transport, from_address: settings.from_address.clone() })
	}
}

fn subject_for(alert: &Alert) -> String {
	if alert.is_escalation {
		format!("[ESCALATION] {:?} — {}", alert.alert_type, alert.symbol)
	} else {
		format!("{:?} — {}", alert.alert_type, alert.symbol)
	}
}

fn html_body(alert: &Alert) -> String {
	format!("<h3>{} {:?}</h3><p>{}</p><p>level: {:?}</p>", alert.symbol, alert.alert_type, alert.message, alert.level)
}

#[async_trait]
impl Channel for EmailChannel {
	fn name(&self) -> &'static str {
		"email"
	}

	async fn send(&self, alert: &Alert, user: &UserConfig, _prefix: &str, _show_confirm_button: bool, _show_mute_buttons: bool) -> Result<SendOutcome, ChannelError> {
		if !user.email.enabled || user.email.to_addresses.is_empty() {
			return Err(ChannelError::NotConfigured);
		}

		let mut builder = Message::builder().from(self.from_address.parse().map_err(|_| ChannelError::NotConfigured)?).subject(subject_for(alert));
		for to in &user.email.to_addresses {
			let mailbox = to.parse().map_err(|_| ChannelError::NotConfigured)?;
			builder = builder.to(mailbox);
		}
		let message = builder.header(ContentType::TEXT_HTML).body(html_body(alert)).map_err(|e| ChannelError::Transient(e.to_string()))?;

		match self.transport.send(message).await {
			Ok(_) => {
				info!(user_id = user.user_id, symbol = %alert.symbol, "alert sent via email");
				Ok(SendOutcome::Sent)
			},
			Err(e) if e.is_timeout() => Err(ChannelError::Timeout),
			Err(e) => {
				error!(user_id = user.user_id, error = %e, "email send failed");
				Err(ChannelError::Transient(e.to_string()))
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alert_engine::{AlertLevel, AlertPayload, AlertType, PricePayload};
	use chrono::Utc;
	use market_feed::MarketType;

	fn sample_alert() -> Alert {
		Alert::new(
			"a1".into(),
			AlertType::PricePump,
			AlertLevel::Warning,
			"BTCUSDT",
			MarketType::Spot,
			"BTCUSDT pumped 8% in 1m",
			AlertPayload::Price(PricePayload { price: 100.0, change_percent: 8.0, horizon: alert_engine::Horizon::M1, high_24h: 110.0, low_24h: 90.0, volume_24h_quote: 1.0, change_24h: 0.0 }),
			7,
			false,
			Utc::now(),
		)
	}

	#[test]
	fn subject_marks_escalation() {
		let mut alert = sample_alert();
		alert.is_escalation = true;
		assert!(subject_for(&alert).starts_with("[ESCALATION]"));
	}

	#[test]
	fn subject_is_plain_without_escalation() {
		let alert = sample_alert();
		assert!(!subject_for(&alert).starts_with("[ESCALATION]"));
	}
}
