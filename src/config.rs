use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

/// Process-level tunables that are not per-user: exchange endpoints, polling
/// cadences, and the channel credentials. Distinct from the per-user store
/// that `user_config::FileUserConfigStore` owns.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub exchange: ExchangeConfig,
	pub feed: FeedSettings,
	pub dispatch: DispatchConfig,
	pub telegram: TelegramConfig,
	#[serde(default)]
	pub smtp: Option<SmtpConfig>,
	pub data_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
	pub spot_api_url: String,
	pub futures_api_url: String,
	pub spot_ws_url: String,
	pub futures_ws_url: String,
	pub quote_asset: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedSettings {
	pub rest_poll_interval_secs: u64,
	pub depth_queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
	pub outbound_spacing_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
	pub bot_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
	pub host: String,
	pub username: String,
	pub password: String,
	pub from_address: String,
}

impl Config {
	pub fn load(path: &str) -> Result<Self> {
		let content = fs::read_to_string(path).with_context(|| format!("failed to read config file: {path}"))?;
		let config: Self = toml::from_str(&content).context("failed to parse config file")?;
		config.validate()?;
		Ok(config)
	}

	fn validate(&self) -> Result<()> {
		if self.telegram.bot_token.is_empty() || self.telegram.bot_token == "YOUR_BOT_TOKEN_HERE" {
			anyhow::bail!("telegram.bot_token must be set to a real token");
		}
		if self.feed.rest_poll_interval_secs == 0 {
			anyhow::bail!("feed.rest_poll_interval_secs must be positive");
		}
		if self.feed.depth_queue_capacity == 0 {
			anyhow::bail!("feed.depth_queue_capacity must be positive");
		}
		if self.dispatch.outbound_spacing_ms == 0 {
			anyhow::bail!("dispatch.outbound_spacing_ms must be positive");
		}
		if let Some(smtp) = &self.smtp {
			if smtp.host.is_empty() || smtp.from_address.is_empty() {
				anyhow::bail!("smtp.host and smtp.from_address must be set when [smtp] is present");
			}
		}
		Ok(())
	}
}
