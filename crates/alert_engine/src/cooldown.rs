use crate::types::{AlertLevel, AlertType};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct CooldownCell {
	last_fired_at: DateTime<Utc>,
	last_level: AlertLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
	Fire,
	FireEscalation,
	Suppress,
}

/// Per-`(user, symbol, alert_type)` cooldown with severity escalation.
/// Suppression never mutates the cell; firing (plain or escalation) always
/// overwrites it with the level that actually fired.
#[derive(Debug, Default)]
pub struct CooldownTable {
	cells: HashMap<(u64, String, AlertType), CooldownCell>,
	escalation_count: u64,
}

impl CooldownTable {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn check(&mut self, user_id: u64, symbol: &str, alert_type: AlertType, current_level: AlertLevel, cooldown_seconds: u64, now: DateTime<Utc>) -> Decision {
		let key = (user_id, symbol.to_string(), alert_type);

		let decision = match self.cells.get(&key) {
			None => Decision::Fire,
			Some(cell) => {
				let elapsed = (now - cell.last_fired_at).num_seconds().max(0) as u64;
				if elapsed >= cooldown_seconds {
					Decision::Fire
				} else if current_level.priority() > cell.last_level.priority() {
					Decision::FireEscalation
				} else {
					Decision::Suppress
				}
			},
		};

		match decision {
			Decision::Fire => {
				self.cells.insert(key, CooldownCell { last_fired_at: now, last_level: current_level });
			},
			Decision::FireEscalation => {
				self.escalation_count += 1;
				self.cells.insert(key, CooldownCell { last_fired_at: now, last_level: current_level });
			},
			Decision::Suppress => {},
		}

		decision
	}

	#[must_use]
	pub fn escalation_count(&self) -> u64 {
		self.escalation_count
	}

	#[must_use]
	pub fn active_cooldowns(&self) -> usize {
		self.cells.len()
	}

	pub fn clear(&mut self, user_id: u64, symbol: &str) {
		self.cells.retain(|(u, s, _), _| !(*u == user_id && s == symbol));
	}

	pub fn clear_all(&mut self) {
		self.cells.clear();
		self.escalation_count = 0;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeDelta;

	#[test]
	fn first_firing_always_fires() {
		let mut table = CooldownTable::new();
		let now = Utc::now();
		assert_eq!(table.check(1, "BTCUSDT", AlertType::PricePump, AlertLevel::Warning, 300, now), Decision::Fire);
	}

	#[test]
	fn within_cooldown_suppresses_same_level() {
		let mut table = CooldownTable::new();
		let now = Utc::now();
		table.check(1, "BTCUSDT", AlertType::PricePump, AlertLevel::Warning, 300, now);
		let later = now + TimeDelta::seconds(10);
		assert_eq!(table.check(1, "BTCUSDT", AlertType::PricePump, AlertLevel::Warning, 300, later), Decision::Suppress);
	}

	#[test]
	fn higher_level_within_cooldown_escalates() {
		let mut table = CooldownTable::new();
		let now = Utc::now();
		table.check(1, "BTCUSDT", AlertType::PricePump, AlertLevel::Warning, 300, now);
		let later = now + TimeDelta::seconds(10);
		assert_eq!(table.check(1, "BTCUSDT", AlertType::PricePump, AlertLevel::Critical, 300, later), Decision::FireEscalation);
		assert_eq!(table.escalation_count(), 1);
	}

	#[test]
	fn cooldown_elapsed_fires_again_without_escalation_count() {
		let mut table = CooldownTable::new();
		let now = Utc::now();
		table.check(1, "BTCUSDT", AlertType::PricePump, AlertLevel::Warning, 300, now);
		let later = now + TimeDelta::seconds(301);
		assert_eq!(table.check(1, "BTCUSDT", AlertType::PricePump, AlertLevel::Warning, 300, later), Decision::Fire);
		assert_eq!(table.escalation_count(), 0);
	}

	#[test]
	fn clear_removes_only_matching_symbol() {
		let mut table = CooldownTable::new();
		let now = Utc::now();
		table.check(1, "BTCUSDT", AlertType::PricePump, AlertLevel::Warning, 300, now);
		table.check(1, "ETHUSDT", AlertType::PricePump, AlertLevel::Warning, 300, now);
		table.clear(1, "BTCUSDT");
		assert_eq!(table.active_cooldowns(), 1);
	}
}
