pub mod logic;
pub mod store;
pub mod types;

pub use store::{FileUserConfigStore, UserConfigStore};
pub use types::{
	AlertMode, BigOrderThreshold, BigOrderTier, Channel, EmailConfig, NightModeConfig, PriceThreshold, RepeatConfig, RepeatParams,
	SpreadThreshold, UserConfig, VolumeThreshold, WatchMode,
};
