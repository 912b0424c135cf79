use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
	All,
	Whitelist,
	Blacklist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertMode {
	Single,
	Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
	Telegram,
	Email,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceThreshold {
	pub pump_1m: f64,
	pub dump_1m: f64,
	pub pump_5m: f64,
	pub dump_5m: f64,
	pub pump_15m: f64,
	pub dump_15m: f64,
	pub pump_1h: f64,
	pub dump_1h: f64,
}

impl Default for PriceThreshold {
	fn default() -> Self {
		// "MODERATE" profile, grounded on the source's default PriceThreshold.
		Self { pump_1m: 6.0, dump_1m: -6.0, pump_5m: 9.0, dump_5m: -9.0, pump_15m: 15.0, dump_15m: -15.0, pump_1h: 21.0, dump_1h: -21.0 }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadThreshold {
	pub spot_futures_percent: f64,
	pub funding_high_percent: f64,
	pub funding_low_percent: f64,
}

impl Default for SpreadThreshold {
	fn default() -> Self {
		Self { spot_futures_percent: 2.5, funding_high_percent: 0.25, funding_low_percent: -0.25 }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeThreshold {
	pub spike_ratio: f64,
	pub large_order_usdt: f64,
}

impl Default for VolumeThreshold {
	fn default() -> Self {
		Self { spike_ratio: 12.0, large_order_usdt: 500_000.0 }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BigOrderTier {
	Small,
	Mid,
	Large,
	Mega,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigOrderThreshold {
	pub enabled: bool,
	pub min_order_small_cap: f64,
	pub min_order_mid_cap: f64,
	pub min_order_large_cap: f64,
	pub min_order_mega_cap: f64,
	pub ratio_small_cap: f64,
	pub ratio_mid_cap: f64,
	pub ratio_large_cap: f64,
	pub ratio_mega_cap: f64,
	pub max_price_deviation_percent: f64,
	pub depth_levels: u32,
}

impl Default for BigOrderThreshold {
	fn default() -> Self {
		Self {
			enabled: true,
			min_order_small_cap: 500_000.0,
			min_order_mid_cap: 2_000_000.0,
			min_order_large_cap: 5_000_000.0,
			min_order_mega_cap: 10_000_000.0,
			ratio_small_cap: 20.0,
			ratio_mid_cap: 10.0,
			ratio_large_cap: 5.0,
			ratio_mega_cap: 2.0,
			max_price_deviation_percent: 5.0,
			depth_levels: 20,
		}
	}
}

impl BigOrderThreshold {
	pub fn tier(&self, volume_24h_quote: f64) -> BigOrderTier {
		if volume_24h_quote < 10_000_000.0 {
			BigOrderTier::Small
		} else if volume_24h_quote < 100_000_000.0 {
			BigOrderTier::Mid
		} else if volume_24h_quote < 1_000_000_000.0 {
			BigOrderTier::Large
		} else {
			BigOrderTier::Mega
		}
	}

	fn tier_abs(&self, tier: BigOrderTier) -> f64 {
		match tier {
			BigOrderTier::Small => self.min_order_small_cap,
			BigOrderTier::Mid => self.min_order_mid_cap,
			BigOrderTier::Large => self.min_order_large_cap,
			BigOrderTier::Mega => self.min_order_mega_cap,
		}
	}

	fn tier_ratio(&self, tier: BigOrderTier) -> f64 {
		match tier {
			BigOrderTier::Small => self.ratio_small_cap,
			BigOrderTier::Mid => self.ratio_mid_cap,
			BigOrderTier::Large => self.ratio_large_cap,
			BigOrderTier::Mega => self.ratio_mega_cap,
		}
	}

	/// `N >= max(min_abs, V * min_ratio / 100)`; when `V <= 0`, only the
	/// small-cap absolute floor applies.
	pub fn is_big_order(&self, notional: f64, volume_24h_quote: f64) -> bool {
		if volume_24h_quote <= 0.0 {
			return notional >= self.min_order_small_cap;
		}
		let tier = self.tier(volume_24h_quote);
		let threshold = self.tier_abs(tier).max(volume_24h_quote * self.tier_ratio(tier) / 100.0);
		notional >= threshold
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatConfig {
	pub enabled: bool,
	pub interval_seconds: u64,
	pub max_repeats: u32,
	pub require_confirm: bool,
}

impl Default for RepeatConfig {
	fn default() -> Self {
		Self { enabled: false, interval_seconds: 10, max_repeats: 30, require_confirm: true }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NightModeConfig {
	pub enabled: bool,
	pub auto_switch: bool,
	pub start_hh_mm: String,
	pub end_hh_mm: String,
	pub interval_seconds: u64,
	pub max_repeats: u32,
	pub add_email: bool,
}

impl Default for NightModeConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			auto_switch: true,
			start_hh_mm: "23:00".to_string(),
			end_hh_mm: "07:00".to_string(),
			interval_seconds: 15,
			max_repeats: 20,
			add_email: true,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailConfig {
	pub enabled: bool,
	pub to_addresses: Vec<String>,
}

/// Parameters the dispatcher's repeat loop actually consumes, already
/// resolved from either the base or night-mode repeat config.
#[derive(Debug, Clone, Copy)]
pub struct RepeatParams {
	pub enabled: bool,
	pub interval_seconds: u64,
	pub max_repeats: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
	pub user_id: u64,
	pub username: String,
	pub chat_id: i64,
	pub is_active: bool,
	pub is_admin: bool,
	pub timezone_offset_hours: i32,

	pub price: PriceThreshold,
	pub spread: SpreadThreshold,
	pub volume: VolumeThreshold,
	pub big_order: BigOrderThreshold,

	pub alert_mode: AlertMode,
	pub night: NightModeConfig,
	pub repeat: RepeatConfig,
	pub email: EmailConfig,
	pub notify_channels: Vec<Channel>,

	pub enable_spot: bool,
	pub enable_futures: bool,
	pub enable_spread: bool,
	pub enable_volume: bool,
	pub enable_funding: bool,
	pub enable_big_order: bool,

	pub cooldown_seconds: u64,
	pub watch_mode: WatchMode,
	pub whitelist: HashSet<String>,
	pub blacklist: HashSet<String>,

	pub min_volume_24h: f64,
	pub volume_filter_enabled: bool,
}

impl Default for UserConfig {
	fn default() -> Self {
		Self {
			user_id: 0,
			username: String::new(),
			chat_id: 0,
			is_active: true,
			is_admin: false,
			timezone_offset_hours: 8,
			price: PriceThreshold::default(),
			spread: SpreadThreshold::default(),
			volume: VolumeThreshold::default(),
			big_order: BigOrderThreshold::default(),
			alert_mode: AlertMode::Single,
			night: NightModeConfig::default(),
			repeat: RepeatConfig::default(),
			email: EmailConfig::default(),
			notify_channels: vec![Channel::Telegram],
			enable_spot: true,
			enable_futures: true,
			enable_spread: true,
			enable_volume: true,
			enable_funding: true,
			enable_big_order: true,
			cooldown_seconds: 300,
			watch_mode: WatchMode::All,
			whitelist: HashSet::new(),
			blacklist: HashSet::new(),
			min_volume_24h: 0.0,
			volume_filter_enabled: false,
		}
	}
}
