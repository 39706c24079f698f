#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Context;
use duochat_domain::Platform;
use futures_util::{SinkExt, StreamExt};
use tokio::time::{Instant, sleep};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};
use url::Url;

use super::eventsub;
use super::helix::{HelixClient, TwitchTokenValidation, validate_user_token};
use crate::{
	AdapterControl, AdapterControlRx, AdapterEvent, AdapterEventTx, EnrichmentLoad, SecretString, SourceAdapter,
	backoff_delay, emit, new_session_id, status, status_error, try_emit,
};

pub(crate) type TwitchWs = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

const SCOPE_READ_CHAT: &str = "user:read:chat";
const SCOPE_READ_MODERATORS: &str = "moderation:read";

/// Twitch EventSub adapter configuration.
#[derive(Clone, Debug)]
pub struct TwitchConfig {
	pub client_id: String,
	pub bot_user_id: String,
	pub bot_oauth_token: SecretString,
	/// Channel whose chat is read (broadcaster user id).
	pub channel_user_id: String,
	pub eventsub_ws_url: String,
	pub helix_base_url: String,
	pub id_base_url: String,
	pub reconnect_min_delay: Duration,
	pub reconnect_max_delay: Duration,
}

impl TwitchConfig {
	pub fn new(
		client_id: impl Into<String>,
		bot_user_id: impl Into<String>,
		bot_oauth_token: SecretString,
		channel_user_id: impl Into<String>,
	) -> Self {
		Self {
			client_id: client_id.into(),
			bot_user_id: bot_user_id.into(),
			bot_oauth_token,
			channel_user_id: channel_user_id.into(),
			eventsub_ws_url: "wss://eventsub.wss.twitch.tv/ws".to_string(),
			helix_base_url: "https://api.twitch.tv".to_string(),
			id_base_url: "https://id.twitch.tv".to_string(),
			reconnect_min_delay: Duration::from_millis(500),
			reconnect_max_delay: Duration::from_secs(30),
		}
	}
}

/// Moderator lookup needs `moderation:read` and a token owned by the broadcaster.
pub(crate) fn moderator_lookup_allowed(validation: &TwitchTokenValidation, channel_user_id: &str) -> Result<(), &'static str> {
	if !validation.has_scope(SCOPE_READ_MODERATORS) {
		return Err("scope moderation:read missing");
	}
	if validation.user_id != channel_user_id {
		return Err("token user is not the broadcaster");
	}
	Ok(())
}

/// Twitch chat source backed by an EventSub websocket.
pub struct TwitchEventSubAdapter {
	cfg: TwitchConfig,
	moderators: HashSet<String>,
	moderator_lookup: bool,
	cheermotes_loaded: bool,
	badges_loaded: bool,
}

enum SessionEnd {
	Shutdown,
	/// Reconnect to the default url and register again.
	Lost,
	/// Twitch moved the session; subscriptions carry over.
	Migrate(String),
}

impl TwitchEventSubAdapter {
	pub fn new(cfg: TwitchConfig) -> Self {
		Self {
			cfg,
			moderators: HashSet::new(),
			moderator_lookup: false,
			cheermotes_loaded: false,
			badges_loaded: false,
		}
	}

	fn helix_client(&self) -> anyhow::Result<HelixClient> {
		let base = Url::parse(&self.cfg.helix_base_url).context("parse helix base url")?;
		HelixClient::new(
			base,
			self.cfg.client_id.clone(),
			self.cfg.bot_oauth_token.expose().to_string(),
		)
	}

	async fn connect_ws(url: &str) -> anyhow::Result<TwitchWs> {
		let url = Url::parse(url).context("parse eventsub ws url")?;
		let (ws, _resp) = tokio_tungstenite::connect_async(url.as_str())
			.await
			.context("connect_async to eventsub ws")?;
		Ok(ws)
	}

	async fn read_until_welcome(ws: &mut TwitchWs) -> anyhow::Result<eventsub::EventSubWelcomeSession> {
		loop {
			let Some(msg) = ws.next().await else {
				anyhow::bail!("ws closed before welcome");
			};
			let msg = msg.context("ws read")?;

			match msg {
				Message::Text(t) => {
					if eventsub::peek(&t)?.message_type == "session_welcome" {
						return eventsub::parse_welcome(&t);
					}
				}
				Message::Ping(p) => {
					let _ = ws.send(Message::Pong(p)).await;
				}
				Message::Close(c) => {
					anyhow::bail!("ws closed before welcome: close={c:?}");
				}
				_ => {}
			}
		}
	}

	/// Check the token and decide whether moderator lookup is possible. `Err` means Twitch chat stays off.
	async fn authorize(&mut self) -> anyhow::Result<()> {
		let validation = validate_user_token(&self.cfg.id_base_url, self.cfg.bot_oauth_token.expose()).await?;
		info!(login = %validation.login, expires_in = validation.expires_in, "twitch oauth token valid");

		if !validation.has_scope(SCOPE_READ_CHAT) {
			anyhow::bail!("scope {SCOPE_READ_CHAT} missing");
		}

		match moderator_lookup_allowed(&validation, &self.cfg.channel_user_id) {
			Ok(()) => self.moderator_lookup = true,
			Err(reason) => {
				warn!(reason, "twitch moderator flags disabled");
				self.moderator_lookup = false;
			}
		}
		Ok(())
	}

	/// Fetch badges and cheermotes until the server has them, and the moderator list on every new session.
	async fn load_metadata(&mut self, helix: &HelixClient, events_tx: &AdapterEventTx) {
		let channel = &self.cfg.channel_user_id;

		if !self.cheermotes_loaded {
			match helix.cheermotes(channel).await {
				Ok(sets) => {
					info!(count = sets.len(), "twitch cheermotes loaded");
					self.cheermotes_loaded =
						emit(events_tx, AdapterEvent::Enrichment(EnrichmentLoad::Cheermotes(sets))).await;
				}
				Err(e) => warn!(error = %e, "failed to fetch twitch cheermotes"),
			}
		}

		if !self.badges_loaded {
			match tokio::try_join!(helix.channel_badges(channel), helix.global_badges()) {
				Ok((channel_sets, global_sets)) => {
					info!(
						channel = channel_sets.len(),
						global = global_sets.len(),
						"twitch badges loaded"
					);
					self.badges_loaded = emit(
						events_tx,
						AdapterEvent::Enrichment(EnrichmentLoad::Badges {
							channel: channel_sets,
							global: global_sets,
						}),
					)
					.await;
				}
				Err(e) => warn!(error = %e, "failed to fetch twitch badges"),
			}
		}

		if self.moderator_lookup {
			match helix.moderator_ids(channel).await {
				Ok(ids) => {
					debug!(count = ids.len(), "twitch moderators loaded");
					self.moderators = ids.into_iter().collect();
				}
				Err(e) => warn!(error = %e, "failed to fetch twitch moderators"),
			}
		}
	}

	async fn pump(
		&self,
		ws: &mut TwitchWs,
		control_rx: &mut AdapterControlRx,
		events_tx: &AdapterEventTx,
		keepalive_timeout: Duration,
	) -> SessionEnd {
		let platform = Platform::Twitch;
		let mut last_activity = Instant::now();

		loop {
			tokio::select! {
				cmd = control_rx.recv() => {
					match cmd {
						Some(AdapterControl::Shutdown) | None => {
							info!(%platform, "twitch adapter received Shutdown");
							let _ = ws.close(None).await;
							return SessionEnd::Shutdown;
						}
					}
				}

				msg = ws.next() => {
					let Some(msg) = msg else {
						try_emit(events_tx, status(platform, false, "eventsub ws ended"));
						return SessionEnd::Lost;
					};

					let msg = match msg {
						Ok(m) => m,
						Err(e) => {
							try_emit(events_tx, status_error(platform, "eventsub ws read error", e));
							return SessionEnd::Lost;
						}
					};

					last_activity = Instant::now();
					match msg {
						Message::Text(t) => {
							let Ok(meta) = eventsub::peek(&t) else {
								debug!(%platform, "ignoring unparseable eventsub frame");
								continue;
							};

							match meta.message_type.as_str() {
								"session_keepalive" => debug!(%platform, "eventsub keepalive"),
								"session_reconnect" => match eventsub::parse_reconnect(&t) {
									Ok(session) => {
										try_emit(events_tx, status(platform, true, "received session_reconnect"));
										let _ = ws.close(None).await;
										return SessionEnd::Migrate(session.reconnect_url);
									}
									Err(e) => warn!(%platform, error = %e, "bad session_reconnect payload"),
								},
								"notification" => match eventsub::try_normalize_chat_message(&t, &self.moderators) {
									Ok(Some(ev)) => {
										try_emit(events_tx, AdapterEvent::Chat(Box::new(ev)));
									}
									Ok(None) => {}
									Err(e) => {
										try_emit(events_tx, status_error(platform, "failed to handle twitch notification", e));
									}
								},
								"revocation" => {
									warn!(%platform, "eventsub subscription revoked");
									return SessionEnd::Lost;
								}
								_ => {}
							}
						}
						Message::Ping(p) => {
							let _ = ws.send(Message::Pong(p)).await;
						}
						Message::Close(frame) => {
							try_emit(events_tx, status(platform, false, format!("eventsub ws closed: {frame:?}")));
							return SessionEnd::Lost;
						}
						_ => {}
					}
				}

				_ = sleep(keepalive_timeout) => {
					if last_activity.elapsed() > keepalive_timeout {
						try_emit(events_tx, status(platform, false, "keepalive watchdog triggered; reconnecting"));
						return SessionEnd::Lost;
					}
				}
			}
		}
	}

	async fn run_loop(mut self, mut control_rx: AdapterControlRx, events_tx: AdapterEventTx) -> anyhow::Result<()> {
		let platform = Platform::Twitch;
		let adapter_session_id = new_session_id();
		try_emit(
			&events_tx,
			status(
				platform,
				false,
				format!("twitch adapter starting (session_id={adapter_session_id})"),
			),
		);

		if let Err(e) = self.authorize().await {
			try_emit(&events_tx, status_error(platform, "twitch token rejected; chat won't be connected", &e));
			return Ok(());
		}

		let helix = match self.helix_client() {
			Ok(h) => h,
			Err(e) => {
				try_emit(&events_tx, status_error(platform, "invalid helix configuration", &e));
				return Ok(());
			}
		};

		let mut reconnect_attempt: u32 = 0;
		let mut ws_url = self.cfg.eventsub_ws_url.clone();
		let mut migrated = false;

		loop {
			if reconnect_attempt > 0 {
				let delay = backoff_delay(reconnect_attempt, self.cfg.reconnect_min_delay, self.cfg.reconnect_max_delay);
				try_emit(
					&events_tx,
					status(platform, false, format!("reconnecting in {delay:?} (attempt={reconnect_attempt})")),
				);
				tokio::select! {
					_ = sleep(delay) => {}
					cmd = control_rx.recv() => {
						if matches!(cmd, Some(AdapterControl::Shutdown) | None) {
							break;
						}
					}
				}
			}

			let mut ws = match Self::connect_ws(&ws_url).await {
				Ok(ws) => ws,
				Err(e) => {
					reconnect_attempt = reconnect_attempt.saturating_add(1);
					try_emit(&events_tx, status_error(platform, "failed to connect eventsub ws", e));
					ws_url = self.cfg.eventsub_ws_url.clone();
					migrated = false;
					continue;
				}
			};

			let welcome = match Self::read_until_welcome(&mut ws).await {
				Ok(w) => w,
				Err(e) => {
					reconnect_attempt = reconnect_attempt.saturating_add(1);
					try_emit(&events_tx, status_error(platform, "failed to read session_welcome", e));
					ws_url = self.cfg.eventsub_ws_url.clone();
					migrated = false;
					continue;
				}
			};

			reconnect_attempt = 0;
			let keepalive_secs = welcome.keepalive_timeout_seconds.unwrap_or(10);

			if !migrated {
				match helix
					.create_chat_message_subscription(&welcome.id, &self.cfg.channel_user_id, &self.cfg.bot_user_id)
					.await
				{
					Ok(sub) => {
						info!(%platform, subscription_id = %sub.id, status = %sub.status, "subscribed to channel.chat.message");
					}
					Err(e) => {
						try_emit(
							&events_tx,
							status_error(platform, "failed to subscribe to channel.chat.message; chat won't be connected", e),
						);
						let _ = ws.close(None).await;
						return Ok(());
					}
				}
				self.load_metadata(&helix, &events_tx).await;
			}

			try_emit(
				&events_tx,
				status(
					platform,
					true,
					format!("eventsub connected (session_id={}, keepalive={keepalive_secs}s)", welcome.id),
				),
			);

			// Twitch allows a few seconds of slack past the advertised keepalive.
			let keepalive_timeout = Duration::from_secs(keepalive_secs + 5);
			match self.pump(&mut ws, &mut control_rx, &events_tx, keepalive_timeout).await {
				SessionEnd::Shutdown => break,
				SessionEnd::Lost => {
					ws_url = self.cfg.eventsub_ws_url.clone();
					migrated = false;
					reconnect_attempt = 1;
				}
				SessionEnd::Migrate(url) => {
					ws_url = url;
					migrated = true;
				}
			}
		}

		try_emit(&events_tx, status(platform, false, "twitch adapter stopped"));
		Ok(())
	}
}

#[async_trait::async_trait]
impl SourceAdapter for TwitchEventSubAdapter {
	fn platform(&self) -> Platform {
		Platform::Twitch
	}

	async fn run(self: Box<Self>, control_rx: AdapterControlRx, events_tx: AdapterEventTx) -> anyhow::Result<()> {
		self.run_loop(control_rx, events_tx).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn validation(user_id: &str, scopes: &[&str]) -> TwitchTokenValidation {
		TwitchTokenValidation {
			client_id: "cid".to_string(),
			login: "bot".to_string(),
			user_id: user_id.to_string(),
			expires_in: 3600,
			scopes: scopes.iter().map(|s| s.to_string()).collect(),
		}
	}

	#[test]
	fn moderator_lookup_requires_scope_and_broadcaster_token() {
		assert!(moderator_lookup_allowed(&validation("1", &["user:read:chat", "moderation:read"]), "1").is_ok());
		assert_eq!(
			moderator_lookup_allowed(&validation("1", &["user:read:chat"]), "1"),
			Err("scope moderation:read missing")
		);
		assert_eq!(
			moderator_lookup_allowed(&validation("2", &["moderation:read"]), "1"),
			Err("token user is not the broadcaster")
		);
	}

	#[test]
	fn config_defaults_point_at_twitch() {
		let cfg = TwitchConfig::new("cid", "bot", SecretString::new("tok"), "chan");
		assert_eq!(cfg.eventsub_ws_url, "wss://eventsub.wss.twitch.tv/ws");
		assert_eq!(cfg.helix_base_url, "https://api.twitch.tv");
		assert!(cfg.reconnect_min_delay < cfg.reconnect_max_delay);
	}

	#[tokio::test]
	async fn unreachable_identity_service_ends_adapter_with_status() {
		let mut cfg = TwitchConfig::new("cid", "bot", SecretString::new("tok"), "chan");
		cfg.id_base_url = "http://127.0.0.1:9".to_string();

		let (_ctl_tx, ctl_rx, ev_tx, mut ev_rx) = crate::bounded_adapter_channels(4, 16);
		let adapter = Box::new(TwitchEventSubAdapter::new(cfg));
		adapter.run(ctl_rx, ev_tx).await.expect("adapter returns Ok");

		let mut saw_error = false;
		while let Ok(ev) = ev_rx.try_recv() {
			if let AdapterEvent::Status(s) = ev
				&& s.last_error.is_some()
			{
				saw_error = true;
			}
		}
		assert!(saw_error);
	}
}
