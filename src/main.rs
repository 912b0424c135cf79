mod config;

use alert_engine::{Alert, AlertEngine, AlertSink};
use anyhow::{Context, Result};
use async_trait::async_trait;
use config::Config;
use dispatcher::channels::{EmailChannel, SmtpSettings, TelegramChannel};
use dispatcher::Dispatcher;
use market_feed::{FeedConfig, FeedSink, MarketFeed, OrderBook, RestConfig, Spread, Ticker};
use std::sync::{Arc, OnceLock};
use teloxide::prelude::*;
use teloxide::types::UpdateKind;
use tokio::sync::watch;
use tracing::{error, info, warn};
use user_config::{FileUserConfigStore, UserConfig, UserConfigStore};

/// Forwards market feed events into the engine once it exists, breaking the
/// feed/engine constructor cycle (the feed needs a sink before the engine
/// that becomes that sink can be built, since the engine itself needs the
/// feed to look up price/volume context).
#[derive(Default)]
struct FeedRelay {
	target: OnceLock<Arc<AlertEngine>>,
}

#[async_trait]
impl FeedSink for FeedRelay {
	async fn on_ticker(&self, ticker: Ticker) {
		if let Some(engine) = self.target.get() {
			engine.on_ticker(ticker).await;
		}
	}
	async fn on_spread(&self, spread: Spread) {
		if let Some(engine) = self.target.get() {
			engine.on_spread(spread).await;
		}
	}
	async fn on_order_book(&self, book: OrderBook) {
		if let Some(engine) = self.target.get() {
			engine.on_order_book(book).await;
		}
	}
}

/// Same relay pattern for the engine/dispatcher cycle: the engine needs a
/// sink before the dispatcher (which needs the engine for cooldown/cache
/// invalidation) can be constructed.
#[derive(Default)]
struct AlertRelay {
	target: OnceLock<Arc<Dispatcher>>,
}

#[async_trait]
impl AlertSink for AlertRelay {
	async fn on_alert(&self, alert: Alert, user: UserConfig) {
		if let Some(dispatcher) = self.target.get() {
			dispatcher.on_alert(alert, user).await;
		}
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
		.init();

	let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
	let config = Config::load(&config_path).context("failed to load configuration")?;
	info!("configuration loaded from {config_path}");

	let users: Arc<dyn UserConfigStore> = Arc::new(
		FileUserConfigStore::load(format!("{}/users.toml", config.data_dir)).await.context("failed to load user config store")?,
	);

	let feed_relay = Arc::new(FeedRelay::default());
	let feed = Arc::new(
		MarketFeed::new(
			FeedConfig {
				rest: RestConfig {
					spot_api_url: config.exchange.spot_api_url.clone(),
					futures_api_url: config.exchange.futures_api_url.clone(),
					quote_asset: config.exchange.quote_asset.clone(),
				},
				spot_ws_url: config.exchange.spot_ws_url.clone(),
				futures_ws_url: config.exchange.futures_ws_url.clone(),
				rest_poll_interval_secs: config.feed.rest_poll_interval_secs,
				depth_queue_capacity: config.feed.depth_queue_capacity,
			},
			feed_relay.clone(),
		)
		.context("failed to construct market feed")?,
	);

	let alert_relay = Arc::new(AlertRelay::default());
	let engine = Arc::new(AlertEngine::new(users.clone(), feed.clone(), alert_relay.clone()));
	if feed_relay.target.set(engine.clone()).is_err() {
		anyhow::bail!("feed relay wired twice");
	}

	let telegram = Arc::new(TelegramChannel::new(&config.telegram.bot_token));
	let email = config.smtp.as_ref().map(|smtp| {
		let settings =
			SmtpSettings { host: smtp.host.clone(), username: smtp.username.clone(), password: smtp.password.clone(), from_address: smtp.from_address.clone() };
		EmailChannel::new(&settings).map(|c| Arc::new(c) as Arc<dyn dispatcher::Channel>)
	});
	let email = match email {
		Some(Ok(channel)) => Some(channel),
		Some(Err(e)) => {
			warn!(error = %e, "smtp configured but transport construction failed, email channel disabled");
			None
		},
		None => None,
	};

	let dispatcher = Dispatcher::with_outbound_spacing(
		users.clone(),
		engine.clone(),
		telegram.clone(),
		email,
		std::time::Duration::from_millis(config.dispatch.outbound_spacing_ms),
	);
	if alert_relay.target.set(dispatcher.clone()).is_err() {
		anyhow::bail!("alert relay wired twice");
	}

	let (shutdown_tx, shutdown_rx) = watch::channel(false);

	let mut handles = dispatcher.spawn(shutdown_rx.clone());
	handles.push(tokio::spawn(feed.clone().run(shutdown_rx.clone())));
	handles.push(tokio::spawn(run_callback_listener(telegram.bot(), users.clone(), dispatcher.clone(), shutdown_rx.clone())));

	info!("sentinel running");

	tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
	info!("shutdown requested");
	let _ = shutdown_tx.send(true);

	for handle in handles {
		let _ = handle.await;
	}

	info!("sentinel stopped");
	Ok(())
}

/// Long-polls Telegram for callback-query updates from the confirm/mute
/// inline buttons and routes them back into the dispatcher. Resolves the
/// originating user by matching the callback's chat id against the active
/// user cache; a user count in the thousands would want an index instead
/// of a linear scan, but this workspace targets a small user base.
async fn run_callback_listener(bot: Bot, users: Arc<dyn UserConfigStore>, dispatcher: Arc<Dispatcher>, mut shutdown: watch::Receiver<bool>) {
	let mut offset: i32 = 0;
	loop {
		tokio::select! {
			_ = shutdown.changed() => { if *shutdown.borrow() { return; } }
			updates = bot.get_updates().offset(offset).timeout(10).send() => {
				let updates = match updates {
					Ok(u) => u,
					Err(e) => {
						warn!(error = %e, "telegram getUpdates failed");
						tokio::time::sleep(std::time::Duration::from_secs(2)).await;
						continue;
					},
				};
				for update in updates {
					offset = offset.max(update.id.0 as i32 + 1);
					if let UpdateKind::CallbackQuery(query) = update.kind {
						handle_callback(&bot, &users, &dispatcher, query).await;
					}
				}
			}
		}
	}
}

async fn handle_callback(bot: &Bot, users: &Arc<dyn UserConfigStore>, dispatcher: &Arc<Dispatcher>, query: teloxide::types::CallbackQuery) {
	let _ = bot.answer_callback_query(query.id.clone()).send().await;

	let Some(data) = query.data else { return };
	let Some(chat_id) = query.message.as_ref().map(teloxide::types::MaybeInaccessibleMessage::chat).map(|c| c.id.0) else { return };

	let Ok(active) = users.get_active_users().await else { return };
	let Some(user) = active.into_iter().find(|u| u.chat_id == chat_id) else { return };

	if let Some(alert_id) = data.strip_prefix("confirm:") {
		if dispatcher.confirm_alert(user.user_id, alert_id).await {
			info!(user_id = user.user_id, alert_id, "alert confirmed via callback");
		}
		return;
	}

	if let Some(rest) = data.strip_prefix("mute:") {
		let Some((alert_id, minutes)) = rest.rsplit_once(':') else { return };
		let Ok(minutes) = minutes.parse::<i64>() else { return };
		let Some(symbol) = dispatcher.pending_symbol(user.user_id, alert_id).await else { return };
		if let Err(e) = dispatcher.mute(user.user_id, &symbol, minutes).await {
			error!(user_id = user.user_id, error = %e, "mute callback failed");
		} else {
			info!(user_id = user.user_id, symbol, minutes, "symbol muted via callback");
		}
	}
}
