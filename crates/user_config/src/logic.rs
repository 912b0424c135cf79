use crate::types::{Channel, RepeatParams, UserConfig, WatchMode};
use chrono::{NaiveTime, Timelike, Utc};
use market_feed::base_asset;

const QUOTE_ASSET: &str = "USDT";

fn matches_any(symbol: &str, list: &std::collections::HashSet<String>) -> bool {
	if list.contains(symbol) {
		return true;
	}
	let symbol_base = base_asset(symbol, QUOTE_ASSET);
	list.iter().any(|entry| base_asset(entry, QUOTE_ASSET) == symbol_base)
}

impl UserConfig {
	/// Gates a symbol against the active watch list before any threshold
	/// evaluation runs at all. The blacklist always suppresses, exact or by
	/// base asset, regardless of `watch_mode`.
	pub fn should_monitor(&self, symbol: &str) -> bool {
		if !self.is_active {
			return false;
		}
		if matches_any(symbol, &self.blacklist) {
			return false;
		}
		match self.watch_mode {
			WatchMode::All | WatchMode::Blacklist => true,
			WatchMode::Whitelist => matches_any(symbol, &self.whitelist),
		}
	}

	/// Volume-gate applied on top of `should_monitor` for metrics the user
	/// has opted to only see on sufficiently liquid symbols.
	pub fn should_monitor_by_volume(&self, volume_24h_quote: f64) -> bool {
		if !self.volume_filter_enabled {
			return true;
		}
		volume_24h_quote >= self.min_volume_24h
	}

	/// Whether `now` (UTC) falls inside this user's configured night window,
	/// once shifted into their local offset. Windows that wrap past
	/// midnight (e.g. 23:00-07:00) are handled by comparing against both
	/// sides of the wrap.
	pub fn is_night_time(&self, now: chrono::DateTime<Utc>) -> bool {
		if !self.night.enabled || !self.night.auto_switch {
			return false;
		}
		let Some(start) = parse_hh_mm(&self.night.start_hh_mm) else { return false };
		let Some(end) = parse_hh_mm(&self.night.end_hh_mm) else { return false };

		let offset = chrono::TimeDelta::hours(i64::from(self.timezone_offset_hours));
		let local = now + offset;
		let t = local.time();

		if start <= end {
			t >= start && t < end
		} else {
			t >= start || t < end
		}
	}

	/// The alert mode actually in effect right now: night mode forces
	/// `Repeat` while the auto-switch window is open, regardless of the
	/// user's base `alert_mode`.
	pub fn get_effective_mode(&self, now: chrono::DateTime<Utc>) -> crate::types::AlertMode {
		if self.is_night_time(now) {
			crate::types::AlertMode::Repeat
		} else {
			self.alert_mode
		}
	}

	/// Resolves the repeat cadence/cap that should drive the dispatcher's
	/// repeat loop for this user right now, folding in the night-mode
	/// override when it applies.
	pub fn get_repeat_config(&self, now: chrono::DateTime<Utc>) -> RepeatParams {
		if self.is_night_time(now) {
			return RepeatParams { enabled: true, interval_seconds: self.night.interval_seconds, max_repeats: self.night.max_repeats };
		}
		RepeatParams { enabled: self.repeat.enabled, interval_seconds: self.repeat.interval_seconds, max_repeats: self.repeat.max_repeats }
	}

	/// Channels that should receive this alert right now. Night mode can
	/// add email on top of the user's configured channel list even if they
	/// never opted into email during the day.
	pub fn get_notify_channels(&self, now: chrono::DateTime<Utc>) -> Vec<Channel> {
		let mut channels = self.notify_channels.clone();
		if self.is_night_time(now) && self.night.add_email && self.email.enabled && !channels.contains(&Channel::Email) {
			channels.push(Channel::Email);
		}
		channels
	}
}

fn parse_hh_mm(s: &str) -> Option<NaiveTime> {
	let (h, m) = s.split_once(':')?;
	NaiveTime::from_hms_opt(h.parse().ok()?, m.parse().ok()?, 0)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::AlertMode;
	use chrono::TimeZone;

	fn at(h: u32, m: u32) -> chrono::DateTime<Utc> {
		Utc.with_ymd_and_hms(2026, 7, 26, h, m, 0).unwrap()
	}

	#[test]
	fn should_monitor_respects_whitelist() {
		let mut cfg = UserConfig { watch_mode: WatchMode::Whitelist, ..Default::default() };
		cfg.whitelist.insert("BTCUSDT".into());
		assert!(cfg.should_monitor("BTCUSDT"));
		assert!(!cfg.should_monitor("ETHUSDT"));
	}

	#[test]
	fn should_monitor_respects_blacklist() {
		let mut cfg = UserConfig { watch_mode: WatchMode::Blacklist, ..Default::default() };
		cfg.blacklist.insert("ETHUSDT".into());
		assert!(cfg.should_monitor("BTCUSDT"));
		assert!(!cfg.should_monitor("ETHUSDT"));
	}

	#[test]
	fn blacklist_suppresses_even_in_whitelist_mode() {
		let mut cfg = UserConfig { watch_mode: WatchMode::Whitelist, ..Default::default() };
		cfg.whitelist.insert("BTCUSDT".into());
		cfg.blacklist.insert("BTCUSDT".into());
		assert!(!cfg.should_monitor("BTCUSDT"));
	}

	#[test]
	fn should_monitor_matches_by_base_asset() {
		let mut cfg = UserConfig { watch_mode: WatchMode::Blacklist, ..Default::default() };
		cfg.blacklist.insert("BTCUSDT".into());
		assert!(!cfg.should_monitor("BTC"));

		let mut cfg = UserConfig { watch_mode: WatchMode::Whitelist, ..Default::default() };
		cfg.whitelist.insert("ETH".into());
		assert!(cfg.should_monitor("ETHUSDT"));
	}

	#[test]
	fn inactive_user_never_monitors() {
		let cfg = UserConfig { is_active: false, ..Default::default() };
		assert!(!cfg.should_monitor("BTCUSDT"));
	}

	#[test]
	fn night_window_wraps_midnight() {
		let cfg = UserConfig { timezone_offset_hours: 0, ..Default::default() };
		assert!(cfg.is_night_time(at(23, 30)));
		assert!(cfg.is_night_time(at(3, 0)));
		assert!(!cfg.is_night_time(at(12, 0)));
	}

	#[test]
	fn effective_mode_is_repeat_during_night() {
		let cfg = UserConfig { timezone_offset_hours: 0, alert_mode: AlertMode::Single, ..Default::default() };
		assert_eq!(cfg.get_effective_mode(at(23, 30)), AlertMode::Repeat);
		assert_eq!(cfg.get_effective_mode(at(12, 0)), AlertMode::Single);
	}

	#[test]
	fn notify_channels_gain_email_at_night_when_configured() {
		let mut cfg = UserConfig { timezone_offset_hours: 0, ..Default::default() };
		cfg.email.enabled = true;
		assert_eq!(cfg.get_notify_channels(at(12, 0)), vec![Channel::Telegram]);
		assert_eq!(cfg.get_notify_channels(at(23, 30)), vec![Channel::Telegram, Channel::Email]);
	}
}
