use chrono::{DateTime, Utc};
use market_feed::MarketType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertType {
	PricePump,
	PriceDump,
	VolumeSpike,
	SpreadHigh,
	SpreadLow,
	FundingHigh,
	FundingLow,
	BigBidOrder,
	BigAskOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertLevel {
	Info,
	Warning,
	Critical,
	Extreme,
}

impl AlertLevel {
	#[must_use]
	pub fn priority(self) -> u8 {
		match self {
			Self::Info => 1,
			Self::Warning => 2,
			Self::Critical => 3,
			Self::Extreme => 4,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertStatus {
	Pending,
	Sent,
	Confirmed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePayload {
	pub price: f64,
	pub change_percent: f64,
	pub horizon: Horizon,
	pub high_24h: f64,
	pub low_24h: f64,
	pub volume_24h_quote: f64,
	pub change_24h: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Horizon {
	M1,
	M5,
	M15,
	H1,
}

impl Horizon {
	#[must_use]
	pub fn label(self) -> &'static str {
		match self {
			Self::M1 => "1m",
			Self::M5 => "5m",
			Self::M15 => "15m",
			Self::H1 => "1h",
		}
	}

	#[must_use]
	pub fn minutes(self) -> i64 {
		match self {
			Self::M1 => 1,
			Self::M5 => 5,
			Self::M15 => 15,
			Self::H1 => 60,
		}
	}

	/// Lower means more urgent: a short-horizon move wins a tie-break against
	/// a longer one of the same magnitude and level.
	#[must_use]
	pub fn urgency_rank(self) -> u8 {
		match self {
			Self::M1 => 0,
			Self::M5 => 1,
			Self::M15 => 2,
			Self::H1 => 3,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumePayload {
	pub price: f64,
	pub volume_ratio: f64,
	pub high_24h: f64,
	pub low_24h: f64,
	pub volume_24h_quote: f64,
	pub change_24h: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadPayload {
	pub spot_price: f64,
	pub futures_price: f64,
	pub spread_percent: f64,
	pub funding_rate_percent: f64,
	pub high_24h: f64,
	pub low_24h: f64,
	pub volume_24h_quote: f64,
	pub change_24h: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingPayload {
	pub spot_price: f64,
	pub futures_price: f64,
	pub spread_percent: f64,
	pub funding_rate_percent: f64,
	pub high_24h: f64,
	pub low_24h: f64,
	pub volume_24h_quote: f64,
	pub change_24h: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigOrderPayload {
	pub current_price: f64,
	pub order_value: f64,
	pub order_price: f64,
	pub price_diff_percent: f64,
	pub bid_ask_ratio: f64,
	pub total_bid_value: f64,
	pub total_ask_value: f64,
	pub volume_24h_quote: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AlertPayload {
	Price(PricePayload),
	Volume(VolumePayload),
	Spread(SpreadPayload),
	Funding(FundingPayload),
	BigOrder(BigOrderPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
	pub id: String,
	pub alert_type: AlertType,
	pub level: AlertLevel,
	pub symbol: String,
	pub market: MarketType,
	pub message: String,
	pub payload: AlertPayload,
	pub target_user_id: u64,
	pub status: AlertStatus,
	pub is_escalation: bool,
	pub sent_count: u32,
	pub last_sent: Option<DateTime<Utc>>,
	pub confirmed_at: Option<DateTime<Utc>>,
	pub timestamp: DateTime<Utc>,
}

impl Alert {
	pub fn new(
		id: String,
		alert_type: AlertType,
		level: AlertLevel,
		symbol: impl Into<String>,
		market: MarketType,
		message: impl Into<String>,
		payload: AlertPayload,
		target_user_id: u64,
		is_escalation: bool,
		now: DateTime<Utc>,
	) -> Self {
		Self {
			id,
			alert_type,
			level,
			symbol: symbol.into(),
			market,
			message: message.into(),
			payload,
			target_user_id,
			status: AlertStatus::Pending,
			is_escalation,
			sent_count: 0,
			last_sent: None,
			confirmed_at: None,
			timestamp: now,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn level_priority_orders_correctly() {
		assert!(AlertLevel::Extreme > AlertLevel::Critical);
		assert!(AlertLevel::Critical > AlertLevel::Warning);
		assert!(AlertLevel::Warning > AlertLevel::Info);
		assert_eq!(AlertLevel::Extreme.priority(), 4);
	}

	#[test]
	fn horizon_urgency_favors_shorter_windows() {
		assert!(Horizon::M1.urgency_rank() < Horizon::H1.urgency_rank());
	}
}
