use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::VecDeque;

/// Bounded rolling window of `(timestamp, price)` / `(timestamp, volume)` samples
/// for one symbol on one market. Capacity mirrors "1h at 5s granularity".
pub const CAPACITY: usize = 720;

const MIN_SAMPLES_FOR_VOLUME_RATIO: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct PriceHistory {
	prices: VecDeque<(DateTime<Utc>, f64)>,
	volumes: VecDeque<(DateTime<Utc>, f64)>,
}

impl PriceHistory {
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a sample, evicting the oldest entry once at capacity. O(1).
	pub fn add(&mut self, now: DateTime<Utc>, price: f64, volume: f64) {
		push_capped(&mut self.prices, (now, price));
		push_capped(&mut self.volumes, (now, volume));
	}

	pub fn len(&self) -> usize {
		self.prices.len()
	}

	pub fn is_empty(&self) -> bool {
		self.prices.is_empty()
	}

	/// `(current - baseline) / baseline * 100`, baseline being the most recent
	/// sample at or before `now - minutes`, falling back to the earliest
	/// retained sample if every sample postdates the cutoff. `None` if fewer
	/// than two samples are retained.
	pub fn change(&self, now: DateTime<Utc>, minutes: i64) -> Option<f64> {
		if self.prices.len() < 2 {
			return None;
		}
		let cutoff = now - ChronoDuration::minutes(minutes);
		let current = self.prices.back()?.1;

		let mut baseline = self.prices.front()?.1;
		for &(t, price) in &self.prices {
			if t > cutoff {
				break;
			}
			baseline = price;
		}

		if baseline == 0.0 {
			return None;
		}
		Some((current - baseline) / baseline * 100.0)
	}

	/// `mean(volumes after cutoff) / mean(volumes at-or-before cutoff)`.
	/// Defaults to `1.0` with fewer than 10 samples or an empty partition.
	pub fn volume_ratio(&self, now: DateTime<Utc>, minutes: i64) -> f64 {
		if self.volumes.len() < MIN_SAMPLES_FOR_VOLUME_RATIO {
			return 1.0;
		}
		let cutoff = now - ChronoDuration::minutes(minutes);

		let (recent, older): (Vec<f64>, Vec<f64>) =
			self.volumes.iter().fold((Vec::new(), Vec::new()), |(mut recent, mut older), &(t, v)| {
				if t > cutoff {
					recent.push(v);
				} else {
					older.push(v);
				}
				(recent, older)
			});

		if recent.is_empty() || older.is_empty() {
			return 1.0;
		}

		let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
		let older_mean = mean(&older);
		if older_mean == 0.0 {
			return 1.0;
		}
		mean(&recent) / older_mean
	}
}

fn push_capped<T>(buf: &mut VecDeque<T>, item: T) {
	if buf.len() >= CAPACITY {
		buf.pop_front();
	}
	buf.push_back(item);
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeDelta;

	fn t(offset_secs: i64) -> DateTime<Utc> {
		Utc::now() + TimeDelta::seconds(offset_secs)
	}

	#[test]
	fn change_is_none_with_fewer_than_two_samples() {
		let mut h = PriceHistory::new();
		assert_eq!(h.change(t(0), 5), None);
		h.add(t(0), 100.0, 1.0);
        assert_eq!(h.change(t(0), 5), None);
	}

	#[test]
	fn change_uses_most_recent_sample_at_or_before_cutoff() {
		let mut h = PriceHistory::new();
		h.add(t(-600), 100.0, 1.0);
		h.add(t(-300), 105.0, 1.0);
		h.add(t(-60), 110.0, 1.0);
		h.add(t(0), 120.0, 1.0);

		// cutoff = now - 5min = t(-300); baseline should be the sample at t(-300) (105.0)
		let change = h.change(t(0), 5).expect("has >=2 samples");
		assert!((change - ((120.0 - 105.0) / 105.0 * 100.0)).abs() < 1e-9);
	}

	#[test]
	fn change_falls_back_to_earliest_when_all_samples_postdate_cutoff() {
		let mut h = PriceHistory::new();
		h.add(t(-10), 100.0, 1.0);
		h.add(t(0), 110.0, 1.0);

		// cutoff = now - 60min, far before any retained sample
		let change = h.change(t(0), 60).expect("has >=2 samples");
		assert!((change - 10.0).abs() < 1e-9);
	}

	#[test]
	fn capacity_is_bounded() {
		let mut h = PriceHistory::new();
		for i in 0..(CAPACITY + 50) {
			h.add(t(i as i64), i as f64, 1.0);
		}
		assert_eq!(h.len(), CAPACITY);
	}

	#[test]
	fn volume_ratio_defaults_to_one_with_few_samples() {
		let mut h = PriceHistory::new();
		for i in 0..5 {
			h.add(t(-i), 1.0, 1.0);
		}
		assert_eq!(h.volume_ratio(t(0), 5), 1.0);
	}

	#[test]
	fn volume_ratio_partitions_recent_vs_older() {
		let mut h = PriceHistory::new();
		for i in 0..10 {
			// older half: low volume
			h.add(t(-600 + i), 1.0, 10.0);
		}
		for i in 0..10 {
			// recent half: high volume
			h.add(t(-i), 1.0, 30.0);
		}
		let ratio = h.volume_ratio(t(0), 5);
		assert!((ratio - 3.0).abs() < 1e-9);
	}
}
