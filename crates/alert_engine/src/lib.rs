pub mod cooldown;
pub mod engine;
pub mod evaluation;
pub mod ids;
pub mod levels;
pub mod types;

pub use cooldown::{CooldownTable, Decision};
pub use engine::{AlertEngine, AlertSink, EngineStats};
pub use types::{
	Alert, AlertLevel, AlertPayload, AlertStatus, AlertType, BigOrderPayload, FundingPayload, Horizon, PricePayload, SpreadPayload,
	VolumePayload,
};
