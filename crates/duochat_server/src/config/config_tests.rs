#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::time::Duration;

use super::*;

fn parse(toml_src: &str) -> ServerConfig {
	let file: FileConfig = toml::from_str(toml_src).expect("valid toml");
	ServerConfig::from_file(file)
}

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
	let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
	move |name| map.get(name).cloned()
}

#[test]
fn empty_file_yields_defaults() {
	let cfg = parse("");
	assert_eq!(cfg.server.bind, "0.0.0.0:6842");
	assert_eq!(cfg.server.max_connections, 0);
	assert_eq!(cfg.feed.history_capacity, 100);
	assert_eq!(cfg.feed.subscriber_queue_capacity, 256);
	assert!(cfg.twitch.enabled);
	assert!(cfg.youtube.enabled);
	assert!(cfg.twitch.adapter_config().is_none(), "no credentials, no adapter");
	assert!(cfg.youtube.adapter_config().is_none());
}

#[test]
fn file_sections_are_read() {
	let cfg = parse(
		r#"
[server]
bind = "127.0.0.1:7000"
health_bind = "127.0.0.1:7001"
max_connections = 8

[feed]
history_capacity = 50

[twitch]
client_id = "cid"
bot_user_id = "42"
bot_oauth_token = "tok"
channel_user_id = "1971641"
reconnect_min_delay_ms = 250

[youtube]
api_key = "key"
channel_name = "Some Channel"
min_poll_interval_ms = 5000
"#,
	);

	assert_eq!(cfg.server.bind, "127.0.0.1:7000");
	assert_eq!(cfg.server.health_bind.as_deref(), Some("127.0.0.1:7001"));
	assert_eq!(cfg.server.max_connections, 8);
	assert_eq!(cfg.feed.to_feed_config().history_capacity, 50);

	let twitch = cfg.twitch.adapter_config().expect("twitch configured");
	assert_eq!(twitch.client_id, "cid");
	assert_eq!(twitch.bot_user_id, "42");
	assert_eq!(twitch.bot_oauth_token.expose(), "tok");
	assert_eq!(twitch.channel_user_id, "1971641");
	assert_eq!(twitch.eventsub_ws_url, "wss://eventsub.wss.twitch.tv/ws");
	assert_eq!(twitch.reconnect_min_delay, Duration::from_millis(250));

	let youtube = cfg.youtube.adapter_config().expect("youtube configured");
	assert_eq!(youtube.channel_name, "Some Channel");
	assert_eq!(youtube.min_poll_interval, Duration::from_secs(5));
}

#[test]
fn blank_values_count_as_unset() {
	let cfg = parse(
		r#"
[twitch]
client_id = "  "
bot_oauth_token = ""
"#,
	);
	assert!(cfg.twitch.client_id.is_none());
	assert!(cfg.twitch.missing().contains(&"bot_oauth_token"));
}

#[test]
fn disabled_source_yields_no_adapter() {
	let cfg = parse(
		r#"
[youtube]
enabled = false
api_key = "key"
channel_name = "chan"
"#,
	);
	assert!(cfg.youtube.adapter_config().is_none());
}

#[test]
fn unprefixed_env_names_are_accepted() {
	let mut cfg = parse("");
	apply_env_overrides(
		&mut cfg,
		env_of(&[
			("CLIENT_ID", "cid"),
			("TWITCH_BOT_USER_ID", "42"),
			("TWITCH_BOT_OAUTH_TOKEN", "tok"),
			("TWITCH_CHAT_CHANNEL_USER_ID", "99"),
			("EVENTSUB_WEBSOCKET_URL", "ws://127.0.0.1:8080/ws"),
			("CLIENT_SECRET", "ignored"),
			("YOUTUBE_CHANNEL_NAME", "chan"),
			("YOUTUBE_API_KEY", "key"),
		]),
	);

	let twitch = cfg.twitch.adapter_config().expect("twitch configured");
	assert_eq!(twitch.eventsub_ws_url, "ws://127.0.0.1:8080/ws");
	assert_eq!(twitch.channel_user_id, "99");
	assert!(cfg.youtube.adapter_config().is_some());
}

#[test]
fn prefixed_env_names_win() {
	let mut cfg = parse("");
	apply_env_overrides(
		&mut cfg,
		env_of(&[
			("DUOCHAT_TWITCH_CLIENT_ID", "prefixed"),
			("CLIENT_ID", "plain"),
			("DUOCHAT_HISTORY_CAPACITY", "10"),
			("DUOCHAT_TWITCH_ENABLED", "off"),
			("DUOCHAT_BIND", "127.0.0.1:9999"),
		]),
	);
	assert_eq!(cfg.twitch.client_id.as_deref(), Some("prefixed"));
	assert_eq!(cfg.feed.history_capacity, 10);
	assert!(!cfg.twitch.enabled);
	assert_eq!(cfg.server.bind, "127.0.0.1:9999");
}

#[test]
fn invalid_numbers_are_ignored() {
	let mut cfg = parse("");
	apply_env_overrides(&mut cfg, env_of(&[("DUOCHAT_HISTORY_CAPACITY", "lots")]));
	assert_eq!(cfg.feed.history_capacity, 100);
}

#[test]
fn reconnect_bounds_are_swapped_when_inverted() {
	let mut cfg = parse("");
	apply_env_overrides(
		&mut cfg,
		env_of(&[
			("DUOCHAT_TWITCH_RECONNECT_MIN_DELAY_MS", "5000"),
			("DUOCHAT_TWITCH_RECONNECT_MAX_DELAY_MS", "100"),
		]),
	);
	assert_eq!(cfg.twitch.reconnect_min_delay, Some(Duration::from_millis(100)));
	assert_eq!(cfg.twitch.reconnect_max_delay, Some(Duration::from_millis(5000)));
}

#[test]
fn missing_file_is_not_an_error() {
	let path = std::env::temp_dir().join("duochat-config-does-not-exist.toml");
	assert!(read_toml_if_exists(&path).expect("ok").is_none());
}

#[test]
fn env_bool_parsing() {
	assert_eq!(parse_env_bool(" Yes "), Some(true));
	assert_eq!(parse_env_bool("0"), Some(false));
	assert_eq!(parse_env_bool("maybe"), None);
}
