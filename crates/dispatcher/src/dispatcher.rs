use crate::channel::{send_with_retry, Channel};
use crate::types::ChannelError;
use alert_engine::{Alert, AlertEngine, AlertSink, AlertStatus};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use user_config::{Channel as NotifyChannel, UserConfig, UserConfigStore};

const DEFAULT_OUTBOUND_SPACING: Duration = Duration::from_millis(50);
const REPEAT_INTERVAL: Duration = Duration::from_secs(5);
const MUTE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct OutboundJob {
	alert: Alert,
	user: UserConfig,
}

/// Turns engine-fired alerts into outbound sends: the primary chat channel
/// is sent directly so its delivery never waits behind queued mail, while
/// email (if configured) goes through a rate-limited outbound queue. Owns
/// the pending/confirmed/mute registries and the background tasks that
/// drive repeats and mute expiry.
pub struct Dispatcher {
	users: Arc<dyn UserConfigStore>,
	engine: Arc<AlertEngine>,
	telegram: Arc<dyn Channel>,
	email: Option<Arc<dyn Channel>>,
	outbound_spacing: Duration,
	outbound_tx: mpsc::UnboundedSender<OutboundJob>,
	outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<OutboundJob>>>,
	pending: Mutex<HashMap<u64, HashMap<String, Alert>>>,
	confirmed: Mutex<HashMap<u64, HashSet<String>>>,
	mutes: Mutex<HashMap<(u64, String), DateTime<Utc>>>,
}

impl Dispatcher {
	#[must_use]
	pub fn new(users: Arc<dyn UserConfigStore>, engine: Arc<AlertEngine>, telegram: Arc<dyn Channel>, email: Option<Arc<dyn Channel>>) -> Arc<Self> {
		Self::with_outbound_spacing(users, engine, telegram, email, DEFAULT_OUTBOUND_SPACING)
	}

	#[must_use]
	pub fn with_outbound_spacing(
		users: Arc<dyn UserConfigStore>,
		engine: Arc<AlertEngine>,
		telegram: Arc<dyn Channel>,
		email: Option<Arc<dyn Channel>>,
		outbound_spacing: Duration,
	) -> Arc<Self> {
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		Arc::new(Self {
			users,
			engine,
			telegram,
			email,
			outbound_spacing,
			outbound_tx,
			outbound_rx: Mutex::new(Some(outbound_rx)),
			pending: Mutex::new(HashMap::new()),
			confirmed: Mutex::new(HashMap::new()),
			mutes: Mutex::new(HashMap::new()),
		})
	}

	/// Spawns the three background roles this dispatcher owns. Every loop
	/// body races its normal work against `shutdown` so it wakes promptly on
	/// shutdown instead of waiting out its current suspension.
	pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
		vec![
			tokio::spawn(self.clone().run_outbound_worker(shutdown.clone())),
			tokio::spawn(self.clone().run_repeat_loop(shutdown.clone())),
			tokio::spawn(self.clone().run_mute_sweeper(shutdown)),
		]
	}

	async fn mark_inactive(&self, user_id: u64) {
		if let Ok(Some(mut user)) = self.users.get(user_id).await {
			user.is_active = false;
			if self.users.upsert(user).await.is_ok() {
				self.engine.invalidate_user_cache().await;
				warn!(user_id, "user marked inactive after permission-denied send");
			}
		}
	}

	async fn run_outbound_worker(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
		let mut rx = self.outbound_rx.lock().await.take().expect("outbound worker spawned twice");
		loop {
			tokio::select! {
				_ = shutdown.changed() => { if *shutdown.borrow() { return; } }
				job = rx.recv() => {
					let Some(job) = job else { return };
					let Some(channel) = &self.email else { continue };
					match send_with_retry(channel.as_ref(), &job.alert, &job.user, "", false, false).await {
						Ok(_) => {},
						Err(ChannelError::PermissionDenied) => self.mark_inactive(job.user.user_id).await,
						Err(e) => error!(user_id = job.user.user_id, error = %e, "email delivery failed"),
					}
					tokio::time::sleep(self.outbound_spacing).await;
				}
			}
		}
	}

	async fn run_repeat_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
		let mut ticker = tokio::time::interval(REPEAT_INTERVAL);
		loop {
			tokio::select! {
				_ = shutdown.changed() => { if *shutdown.borrow() { return; } }
				_ = ticker.tick() => self.repeat_cycle().await,
			}
		}
	}

	async fn repeat_cycle(&self) {
		let now = Utc::now();
		let candidates: Vec<(u64, Alert)> = {
			let pending = self.pending.lock().await;
			let mut out = Vec::new();
			for (user_id, alerts) in pending.iter() {
				for alert in alerts.values() {
					out.push((*user_id, alert.clone()));
				}
			}
			out
		};
		if candidates.is_empty() {
			return;
		}

		for (user_id, alert) in candidates {
			let Ok(Some(user)) = self.users.get(user_id).await else {
				self.drop_pending(user_id, &alert.id).await;
				continue;
			};
			if !user.is_active {
				self.drop_pending(user_id, &alert.id).await;
				continue;
			}
			if self.is_confirmed(user_id, &alert.id).await {
				self.drop_pending(user_id, &alert.id).await;
				continue;
			}
			if self.is_muted(user_id, &alert.symbol).await {
				self.drop_pending(user_id, &alert.id).await;
				continue;
			}
			let repeat = user.get_repeat_config(now);
			if alert.sent_count >= repeat.max_repeats {
				self.drop_pending(user_id, &alert.id).await;
				continue;
			}
			let due = alert.last_sent.is_none_or(|last| (now - last) >= ChronoDuration::seconds(repeat.interval_seconds as i64));
			if !due {
				continue;
			}

			let mut resend = alert.clone();
			resend.sent_count += 1;
			resend.last_sent = Some(now);
			resend.status = AlertStatus::Sent;

			match send_with_retry(self.telegram.as_ref(), &resend, &user, "", true, true).await {
				Ok(_) => {
					let mut pending = self.pending.lock().await;
					if let Some(alerts) = pending.get_mut(&user_id) {
						alerts.insert(resend.id.clone(), resend);
					}
				},
				Err(ChannelError::PermissionDenied) => {
					self.mark_inactive(user_id).await;
					self.drop_pending(user_id, &alert.id).await;
				},
				Err(e) => {
					error!(user_id, alert_id = %alert.id, error = %e, "repeat send failed, dropping from pending");
					self.drop_pending(user_id, &alert.id).await;
				},
			}
		}
	}

	async fn drop_pending(&self, user_id: u64, alert_id: &str) {
		let mut pending = self.pending.lock().await;
		if let Some(alerts) = pending.get_mut(&user_id) {
			alerts.remove(alert_id);
		}
	}

	async fn is_confirmed(&self, user_id: u64, alert_id: &str) -> bool {
		self.confirmed.lock().await.get(&user_id).is_some_and(|ids| ids.contains(alert_id))
	}

	async fn is_muted(&self, user_id: u64, symbol: &str) -> bool {
		self.mutes.lock().await.contains_key(&(user_id, symbol.to_string()))
	}

	async fn run_mute_sweeper(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
		let mut ticker = tokio::time::interval(MUTE_SWEEP_INTERVAL);
		loop {
			tokio::select! {
				_ = shutdown.changed() => { if *shutdown.borrow() { return; } }
				_ = ticker.tick() => self.sweep_expired_mutes().await,
			}
		}
	}

	async fn sweep_expired_mutes(&self) {
		let now = Utc::now();
		let expired: Vec<(u64, String)> = {
			let mutes = self.mutes.lock().await;
			mutes.iter().filter(|(_, expiry)| **expiry <= now).map(|(key, _)| key.clone()).collect()
		};

		for (user_id, symbol) in expired {
			if let Err(e) = self.unmute(user_id, &symbol).await {
				error!(user_id, symbol = %symbol, error = %e, "failed to unmute expired entry");
				continue;
			}
			if let Ok(Some(user)) = self.users.get(user_id).await {
				let text = format!("{symbol} is unmuted, alerts resume.");
				let _ = self.telegram.send_text(&user, &text).await;
			}
		}
	}

	/// Exact match first; falls back to a unique prefix/substring match
	/// against this user's pending ids (callback payloads are length
	/// limited, so the inbound id may be a truncated prefix).
	pub async fn confirm_alert(&self, user_id: u64, alert_id: &str) -> bool {
		let matched = {
			let pending = self.pending.lock().await;
			let Some(user_pending) = pending.get(&user_id) else { return false };
			if user_pending.contains_key(alert_id) {
				Some(alert_id.to_string())
			} else {
				let matches: Vec<&String> = user_pending.keys().filter(|id| id.starts_with(alert_id) || alert_id.contains(id.as_str())).collect();
				match matches.as_slice() {
					[single] => Some((*single).clone()),
					_ => None,
				}
			}
		};

		let Some(id) = matched else { return false };
		self.drop_pending(user_id, &id).await;
		self.confirmed.lock().await.entry(user_id).or_default().insert(id);
		true
	}

	/// Adds `symbol` to the user's blacklist, confirms (drops) any pending
	/// alerts for it, clears engine cooldowns, and records the mute expiry.
	pub async fn mute(&self, user_id: u64, symbol: &str, minutes: i64) -> anyhow::Result<()> {
		if let Some(mut user) = self.users.get(user_id).await? {
			user.blacklist.insert(symbol.to_string());
			self.users.upsert(user).await?;
			self.engine.invalidate_user_cache().await;
		}

		let to_confirm: Vec<String> = {
			let pending = self.pending.lock().await;
			pending.get(&user_id).map(|alerts| alerts.values().filter(|a| a.symbol == symbol).map(|a| a.id.clone()).collect()).unwrap_or_default()
		};
		for id in to_confirm {
			self.drop_pending(user_id, &id).await;
			self.confirmed.lock().await.entry(user_id).or_default().insert(id);
		}

		self.engine.clear_cooldowns(user_id, symbol).await;
		self.mutes.lock().await.insert((user_id, symbol.to_string()), Utc::now() + ChronoDuration::minutes(minutes));
		info!(user_id, symbol, minutes, "symbol muted");
		Ok(())
	}

	pub async fn unmute(&self, user_id: u64, symbol: &str) -> anyhow::Result<()> {
		if let Some(mut user) = self.users.get(user_id).await? {
			user.blacklist.remove(symbol);
			self.users.upsert(user).await?;
			self.engine.invalidate_user_cache().await;
		}
		self.mutes.lock().await.remove(&(user_id, symbol.to_string()));
		Ok(())
	}

	pub async fn pending_count(&self, user_id: u64) -> usize {
		self.pending.lock().await.get(&user_id).map_or(0, HashMap::len)
	}

	/// Looks up the symbol a still-pending alert id refers to, using the
	/// same exact-or-unique-prefix matching as `confirm_alert` since inline
	/// button callback data can carry a truncated id.
	pub async fn pending_symbol(&self, user_id: u64, alert_id: &str) -> Option<String> {
		let pending = self.pending.lock().await;
		let user_pending = pending.get(&user_id)?;
		if let Some(alert) = user_pending.get(alert_id) {
			return Some(alert.symbol.clone());
		}
		let matches: Vec<&Alert> = user_pending.values().filter(|a| a.id.starts_with(alert_id) || alert_id.contains(a.id.as_str())).collect();
		match matches.as_slice() {
			[single] => Some(single.symbol.clone()),
			_ => None,
		}
	}
}

#[async_trait]
impl AlertSink for Dispatcher {
	async fn on_alert(&self, mut alert: Alert, user: UserConfig) {
		let now = Utc::now();
		alert.sent_count = 1;
		alert.last_sent = Some(now);
		alert.status = AlertStatus::Sent;

		let repeat = user.get_effective_mode(now) == user_config::AlertMode::Repeat;
		let channels = user.get_notify_channels(now);

		match send_with_retry(self.telegram.as_ref(), &alert, &user, "", repeat, repeat).await {
			Ok(_) => {},
			Err(ChannelError::PermissionDenied) => {
				self.mark_inactive(user.user_id).await;
				return;
			},
			Err(e) => warn!(user_id = user.user_id, error = %e, "primary channel send failed"),
		}

		if repeat {
			self.pending.lock().await.entry(user.user_id).or_default().insert(alert.id.clone(), alert.clone());
		}

		if channels.contains(&NotifyChannel::Email) && self.email.is_some() {
			let _ = self.outbound_tx.send(OutboundJob { alert, user });
		}
	}
}
