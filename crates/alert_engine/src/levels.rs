use crate::types::AlertLevel;

/// Shared shape for the four single-metric classifiers: top-down bucket
/// check against an absolute value.
fn classify(abs_value: f64, warning: f64, critical: f64, extreme: f64) -> AlertLevel {
	if abs_value >= extreme {
		AlertLevel::Extreme
	} else if abs_value >= critical {
		AlertLevel::Critical
	} else if abs_value >= warning {
		AlertLevel::Warning
	} else {
		AlertLevel::Info
	}
}

#[must_use]
pub fn classify_price_change(change_percent: f64) -> AlertLevel {
	classify(change_percent.abs(), 5.0, 10.0, 20.0)
}

#[must_use]
pub fn classify_spread(spread_percent: f64) -> AlertLevel {
	classify(spread_percent.abs(), 1.5, 3.0, 5.0)
}

#[must_use]
pub fn classify_funding(funding_rate_percent: f64) -> AlertLevel {
	classify(funding_rate_percent.abs(), 0.1, 0.3, 0.5)
}

#[must_use]
pub fn classify_volume_ratio(ratio: f64) -> AlertLevel {
	classify(ratio, 10.0, 20.0, 50.0)
}

/// Level classification on the big-order ratio `R = (N/V)*100`, which uses
/// its own coarser thresholds independent of the tiering ratios used by
/// `is_big_order`.
#[must_use]
pub fn classify_big_order(order_value: f64, volume_24h_quote: f64) -> AlertLevel {
	let ratio = if volume_24h_quote > 0.0 { order_value / volume_24h_quote * 100.0 } else { 0.0 };

	if ratio >= 50.0 || order_value >= 50_000_000.0 {
		AlertLevel::Extreme
	} else if ratio >= 20.0 || order_value >= 20_000_000.0 {
		AlertLevel::Critical
	} else if ratio >= 10.0 || order_value >= 5_000_000.0 {
		AlertLevel::Warning
	} else {
		AlertLevel::Info
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn price_change_buckets() {
		assert_eq!(classify_price_change(4.9), AlertLevel::Info);
		assert_eq!(classify_price_change(-5.0), AlertLevel::Warning);
		assert_eq!(classify_price_change(10.0), AlertLevel::Critical);
		assert_eq!(classify_price_change(-20.5), AlertLevel::Extreme);
	}

	#[test]
	fn big_order_ratio_or_absolute_either_qualifies() {
		assert_eq!(classify_big_order(6_000_000.0, 1_000_000_000.0), AlertLevel::Warning);
		assert_eq!(classify_big_order(21_000_000.0, 1_000_000_000_000.0), AlertLevel::Critical);
		assert_eq!(classify_big_order(1_000.0, 0.0), AlertLevel::Info);
	}

	#[test]
	fn volume_ratio_buckets() {
		assert_eq!(classify_volume_ratio(9.9), AlertLevel::Info);
		assert_eq!(classify_volume_ratio(50.0), AlertLevel::Extreme);
	}
}
