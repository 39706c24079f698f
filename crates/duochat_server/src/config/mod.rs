#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use duochat_platform::SecretString;
use duochat_platform::twitch::TwitchConfig;
use duochat_platform::youtube::YouTubeConfig;
use serde::Deserialize;
use tracing::{info, warn};

use crate::feed::FeedConfig;
use crate::feed::hub::DEFAULT_SUBSCRIBER_QUEUE_CAPACITY;
use crate::feed::store::DEFAULT_HISTORY_CAPACITY;

pub const DEFAULT_BIND: &str = "0.0.0.0:6842";

/// Default config path: `~/.duochat/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".duochat").join("config.toml"))
}

/// Load the server config from TOML, then apply env overrides.
pub fn load_server_config_from_path(path: &Path) -> anyhow::Result<ServerConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ServerConfig::from_file(file_cfg);
	apply_env_overrides(&mut cfg, |name| std::env::var(name).ok());
	Ok(cfg)
}

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub server: ServerSettings,
	pub feed: FeedSettings,
	pub twitch: TwitchSettings,
	pub youtube: YouTubeSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
	/// QUIC bind address (host:port).
	pub bind: String,
	/// PEM-encoded certificate path for QUIC/TLS.
	pub tls_cert_path: Option<PathBuf>,
	/// PEM-encoded private key path for QUIC/TLS.
	pub tls_key_path: Option<PathBuf>,
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
	/// Optional health/readiness HTTP bind address (host:port).
	pub health_bind: Option<String>,
	/// Concurrent client limit; 0 means unlimited.
	pub max_connections: usize,
}

impl Default for ServerSettings {
	fn default() -> Self {
		Self {
			bind: DEFAULT_BIND.to_string(),
			tls_cert_path: None,
			tls_key_path: None,
			metrics_bind: None,
			health_bind: None,
			max_connections: 0,
		}
	}
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
	pub history_capacity: usize,
	pub subscriber_queue_capacity: usize,
}

impl Default for FeedSettings {
	fn default() -> Self {
		Self {
			history_capacity: DEFAULT_HISTORY_CAPACITY,
			subscriber_queue_capacity: DEFAULT_SUBSCRIBER_QUEUE_CAPACITY,
		}
	}
}

impl FeedSettings {
	pub fn to_feed_config(&self) -> FeedConfig {
		FeedConfig {
			history_capacity: self.history_capacity,
			subscriber_queue_capacity: self.subscriber_queue_capacity,
		}
	}
}

#[derive(Debug, Clone)]
pub struct TwitchSettings {
	pub enabled: bool,
	pub client_id: Option<String>,
	pub bot_user_id: Option<String>,
	pub bot_oauth_token: Option<SecretString>,
	/// Broadcaster whose chat is read.
	pub channel_user_id: Option<String>,
	pub eventsub_ws_url: Option<String>,
	pub helix_base_url: Option<String>,
	pub id_base_url: Option<String>,
	pub reconnect_min_delay: Option<Duration>,
	pub reconnect_max_delay: Option<Duration>,
}

impl Default for TwitchSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			client_id: None,
			bot_user_id: None,
			bot_oauth_token: None,
			channel_user_id: None,
			eventsub_ws_url: None,
			helix_base_url: None,
			id_base_url: None,
			reconnect_min_delay: None,
			reconnect_max_delay: None,
		}
	}
}

impl TwitchSettings {
	/// Names of required settings that are still unset.
	pub fn missing(&self) -> Vec<&'static str> {
		let mut missing = Vec::new();
		if self.client_id.is_none() {
			missing.push("client_id");
		}
		if self.bot_user_id.is_none() {
			missing.push("bot_user_id");
		}
		if self.bot_oauth_token.as_ref().is_none_or(|t| t.is_empty()) {
			missing.push("bot_oauth_token");
		}
		if self.channel_user_id.is_none() {
			missing.push("channel_user_id");
		}
		missing
	}

	/// Adapter config, or `None` when disabled or incomplete.
	pub fn adapter_config(&self) -> Option<TwitchConfig> {
		if !self.enabled {
			info!("twitch source disabled by config");
			return None;
		}

		let missing = self.missing();
		if !missing.is_empty() {
			warn!(missing = ?missing, "twitch source disabled: missing credentials");
			return None;
		}

		let mut cfg = TwitchConfig::new(
			self.client_id.clone()?,
			self.bot_user_id.clone()?,
			self.bot_oauth_token.clone()?,
			self.channel_user_id.clone()?,
		);
		if let Some(url) = self.eventsub_ws_url.clone() {
			cfg.eventsub_ws_url = url;
		}
		if let Some(url) = self.helix_base_url.clone() {
			cfg.helix_base_url = url;
		}
		if let Some(url) = self.id_base_url.clone() {
			cfg.id_base_url = url;
		}
		if let Some(min) = self.reconnect_min_delay {
			cfg.reconnect_min_delay = min;
		}
		if let Some(max) = self.reconnect_max_delay {
			cfg.reconnect_max_delay = max;
		}
		Some(cfg)
	}
}

#[derive(Debug, Clone)]
pub struct YouTubeSettings {
	pub enabled: bool,
	pub api_key: Option<SecretString>,
	pub channel_name: Option<String>,
	pub api_base_url: Option<String>,
	pub min_poll_interval: Option<Duration>,
}

impl Default for YouTubeSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			api_key: None,
			channel_name: None,
			api_base_url: None,
			min_poll_interval: None,
		}
	}
}

impl YouTubeSettings {
	pub fn adapter_config(&self) -> Option<YouTubeConfig> {
		if !self.enabled {
			info!("youtube source disabled by config");
			return None;
		}

		let (Some(api_key), Some(channel_name)) = (self.api_key.clone(), self.channel_name.clone()) else {
			warn!(
				has_api_key = self.api_key.is_some(),
				has_channel_name = self.channel_name.is_some(),
				"youtube source disabled: missing api_key or channel_name"
			);
			return None;
		};

		let mut cfg = YouTubeConfig::new(api_key, channel_name);
		if let Some(url) = self.api_base_url.clone() {
			cfg.api_base_url = url;
		}
		if let Some(interval) = self.min_poll_interval {
			cfg.min_poll_interval = interval;
		}
		Some(cfg)
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	server: FileServerSettings,

	#[serde(default)]
	feed: FileFeedSettings,

	#[serde(default)]
	twitch: FileTwitchSettings,

	#[serde(default)]
	youtube: FileYouTubeSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileServerSettings {
	bind: Option<String>,
	tls_cert_path: Option<String>,
	tls_key_path: Option<String>,
	metrics_bind: Option<String>,
	health_bind: Option<String>,
	max_connections: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileFeedSettings {
	history_capacity: Option<usize>,
	subscriber_queue_capacity: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileTwitchSettings {
	enabled: Option<bool>,
	client_id: Option<String>,
	bot_user_id: Option<String>,
	bot_oauth_token: Option<String>,
	channel_user_id: Option<String>,
	eventsub_ws_url: Option<String>,
	helix_base_url: Option<String>,
	id_base_url: Option<String>,
	reconnect_min_delay_ms: Option<u64>,
	reconnect_max_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileYouTubeSettings {
	enabled: Option<bool>,
	api_key: Option<String>,
	channel_name: Option<String>,
	api_base_url: Option<String>,
	min_poll_interval_ms: Option<u64>,
}

fn non_blank(v: Option<String>) -> Option<String> {
	v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl ServerConfig {
	fn from_file(file: FileConfig) -> Self {
		let server_defaults = ServerSettings::default();
		let feed_defaults = FeedSettings::default();

		Self {
			server: ServerSettings {
				bind: non_blank(file.server.bind).unwrap_or(server_defaults.bind),
				tls_cert_path: non_blank(file.server.tls_cert_path).map(PathBuf::from),
				tls_key_path: non_blank(file.server.tls_key_path).map(PathBuf::from),
				metrics_bind: non_blank(file.server.metrics_bind),
				health_bind: non_blank(file.server.health_bind),
				max_connections: file.server.max_connections.unwrap_or(server_defaults.max_connections),
			},
			feed: FeedSettings {
				history_capacity: file.feed.history_capacity.unwrap_or(feed_defaults.history_capacity),
				subscriber_queue_capacity: file
					.feed
					.subscriber_queue_capacity
					.unwrap_or(feed_defaults.subscriber_queue_capacity),
			},
			twitch: TwitchSettings {
				enabled: file.twitch.enabled.unwrap_or(true),
				client_id: non_blank(file.twitch.client_id),
				bot_user_id: non_blank(file.twitch.bot_user_id),
				bot_oauth_token: non_blank(file.twitch.bot_oauth_token).map(SecretString::new),
				channel_user_id: non_blank(file.twitch.channel_user_id),
				eventsub_ws_url: non_blank(file.twitch.eventsub_ws_url),
				helix_base_url: non_blank(file.twitch.helix_base_url),
				id_base_url: non_blank(file.twitch.id_base_url),
				reconnect_min_delay: file.twitch.reconnect_min_delay_ms.map(Duration::from_millis),
				reconnect_max_delay: file.twitch.reconnect_max_delay_ms.map(Duration::from_millis),
			},
			youtube: YouTubeSettings {
				enabled: file.youtube.enabled.unwrap_or(true),
				api_key: non_blank(file.youtube.api_key).map(SecretString::new),
				channel_name: non_blank(file.youtube.channel_name),
				api_base_url: non_blank(file.youtube.api_base_url),
				min_poll_interval: file.youtube.min_poll_interval_ms.map(Duration::from_millis),
			},
		}
	}
}

pub fn parse_env_bool(v: &str) -> Option<bool> {
	match v.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

/// First non-blank value among `names`, with the name that supplied it.
fn lookup<'a>(env: &impl Fn(&str) -> Option<String>, names: &[&'a str]) -> Option<(&'a str, String)> {
	names.iter().find_map(|name| non_blank(env(name)).map(|v| (*name, v)))
}

fn apply_env_overrides(cfg: &mut ServerConfig, env: impl Fn(&str) -> Option<String>) {
	if let Some((var, v)) = lookup(&env, &["DUOCHAT_BIND"]) {
		cfg.server.bind = v;
		info!(var, "server config: bind overridden by env");
	}

	if let Some((var, v)) = lookup(&env, &["DUOCHAT_TLS_CERT"]) {
		cfg.server.tls_cert_path = Some(PathBuf::from(v));
		info!(var, "server config: tls_cert_path overridden by env");
	}

	if let Some((var, v)) = lookup(&env, &["DUOCHAT_TLS_KEY"]) {
		cfg.server.tls_key_path = Some(PathBuf::from(v));
		info!(var, "server config: tls_key_path overridden by env");
	}

	if let Some((var, v)) = lookup(&env, &["DUOCHAT_METRICS_BIND"]) {
		cfg.server.metrics_bind = Some(v);
		info!(var, "server config: metrics_bind overridden by env");
	}

	if let Some((var, v)) = lookup(&env, &["DUOCHAT_HEALTH_BIND"]) {
		cfg.server.health_bind = Some(v);
		info!(var, "server config: health_bind overridden by env");
	}

	if let Some((var, v)) = lookup(&env, &["DUOCHAT_MAX_CONNECTIONS"])
		&& let Ok(max) = v.parse::<usize>()
	{
		cfg.server.max_connections = max;
		info!(var, max, "server config: max_connections overridden by env");
	}

	if let Some((var, v)) = lookup(&env, &["DUOCHAT_HISTORY_CAPACITY"])
		&& let Ok(capacity) = v.parse::<usize>()
	{
		cfg.feed.history_capacity = capacity;
		info!(var, capacity, "feed config: history_capacity overridden by env");
	}

	if let Some((var, v)) = lookup(&env, &["DUOCHAT_SUBSCRIBER_QUEUE_CAPACITY"])
		&& let Ok(capacity) = v.parse::<usize>()
	{
		cfg.feed.subscriber_queue_capacity = capacity;
		info!(var, capacity, "feed config: subscriber_queue_capacity overridden by env");
	}

	if let Some((var, v)) = lookup(&env, &["DUOCHAT_TWITCH_ENABLED"])
		&& let Some(enabled) = parse_env_bool(&v)
	{
		cfg.twitch.enabled = enabled;
		info!(var, enabled, "twitch config: enabled overridden by env");
	}

	if let Some((var, v)) = lookup(&env, &["DUOCHAT_TWITCH_CLIENT_ID", "CLIENT_ID"]) {
		cfg.twitch.client_id = Some(v);
		info!(var, "twitch config: client_id overridden by env");
	}

	if let Some((var, v)) = lookup(&env, &["DUOCHAT_TWITCH_BOT_USER_ID", "TWITCH_BOT_USER_ID"]) {
		cfg.twitch.bot_user_id = Some(v);
		info!(var, "twitch config: bot_user_id overridden by env");
	}

	if let Some((var, v)) = lookup(&env, &["DUOCHAT_TWITCH_BOT_OAUTH_TOKEN", "TWITCH_BOT_OAUTH_TOKEN"]) {
		cfg.twitch.bot_oauth_token = Some(SecretString::new(v));
		info!(var, "twitch config: bot_oauth_token overridden by env");
	}

	if let Some((var, v)) = lookup(&env, &["DUOCHAT_TWITCH_CHANNEL_USER_ID", "TWITCH_CHAT_CHANNEL_USER_ID"]) {
		cfg.twitch.channel_user_id = Some(v);
		info!(var, "twitch config: channel_user_id overridden by env");
	}

	if let Some((var, v)) = lookup(&env, &["DUOCHAT_TWITCH_EVENTSUB_WS_URL", "EVENTSUB_WEBSOCKET_URL"]) {
		cfg.twitch.eventsub_ws_url = Some(v);
		info!(var, "twitch config: eventsub_ws_url overridden by env");
	}

	if let Some((var, v)) = lookup(&env, &["DUOCHAT_TWITCH_RECONNECT_MIN_DELAY_MS"])
		&& let Ok(ms) = v.parse::<u64>()
	{
		cfg.twitch.reconnect_min_delay = Some(Duration::from_millis(ms));
		info!(var, ms, "twitch config: reconnect_min_delay overridden by env");
	}

	if let Some((var, v)) = lookup(&env, &["DUOCHAT_TWITCH_RECONNECT_MAX_DELAY_MS"])
		&& let Ok(ms) = v.parse::<u64>()
	{
		cfg.twitch.reconnect_max_delay = Some(Duration::from_millis(ms));
		info!(var, ms, "twitch config: reconnect_max_delay overridden by env");
	}

	if lookup(&env, &["CLIENT_SECRET", "DUOCHAT_TWITCH_CLIENT_SECRET"]).is_some() {
		info!("twitch config: client secret is not used (user token flow only); ignoring");
	}

	if let Some((var, v)) = lookup(&env, &["DUOCHAT_YOUTUBE_ENABLED"])
		&& let Some(enabled) = parse_env_bool(&v)
	{
		cfg.youtube.enabled = enabled;
		info!(var, enabled, "youtube config: enabled overridden by env");
	}

	if let Some((var, v)) = lookup(&env, &["DUOCHAT_YOUTUBE_API_KEY", "YOUTUBE_API_KEY"]) {
		cfg.youtube.api_key = Some(SecretString::new(v));
		info!(var, "youtube config: api_key overridden by env");
	}

	if let Some((var, v)) = lookup(&env, &["DUOCHAT_YOUTUBE_CHANNEL_NAME", "YOUTUBE_CHANNEL_NAME"]) {
		cfg.youtube.channel_name = Some(v);
		info!(var, "youtube config: channel_name overridden by env");
	}

	if let Some((var, v)) = lookup(&env, &["DUOCHAT_YOUTUBE_MIN_POLL_INTERVAL_MS"])
		&& let Ok(ms) = v.parse::<u64>()
	{
		cfg.youtube.min_poll_interval = Some(Duration::from_millis(ms));
		info!(var, ms, "youtube config: min_poll_interval overridden by env");
	}

	if let (Some(min), Some(max)) = (cfg.twitch.reconnect_min_delay, cfg.twitch.reconnect_max_delay)
		&& min > max
	{
		warn!(
			min_ms = min.as_millis(),
			max_ms = max.as_millis(),
			"twitch config: reconnect_min_delay > reconnect_max_delay; swapping"
		);
		cfg.twitch.reconnect_min_delay = Some(max);
		cfg.twitch.reconnect_max_delay = Some(min);
	}
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
