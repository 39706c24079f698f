#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use duochat_domain::{BadgeSet, CheermoteImage, CheermoteSet, CheermoteTier};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

const EVENTSUB_SUBSCRIPTIONS_PATH: &str = "/helix/eventsub/subscriptions";
const CHAT_BADGES_PATH: &str = "/helix/chat/badges";
const CHAT_BADGES_GLOBAL_PATH: &str = "/helix/chat/badges/global";
const CHEERMOTES_PATH: &str = "/helix/bits/cheermotes";
const MODERATORS_PATH: &str = "/helix/moderation/moderators";
const TOKEN_VALIDATE_PATH: &str = "/oauth2/validate";

const USER_AGENT: &str = "duochat/0.x (eventsub-ws)";

fn retry_delay_from_headers(headers: &HeaderMap) -> Option<Duration> {
	if let Some(v) = headers.get(RETRY_AFTER)
		&& let Ok(s) = v.to_str()
		&& let Ok(secs) = s.trim().parse::<u64>()
	{
		return Some(Duration::from_secs(secs));
	}

	if let Some(v) = headers.get("Ratelimit-Reset")
		&& let Ok(s) = v.to_str()
		&& let Ok(reset_unix) = s.trim().parse::<u64>()
	{
		let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
		if reset_unix > now {
			return Some(Duration::from_secs(reset_unix - now));
		}
	}

	None
}

/// Send once, retrying a single time on 429 (honouring reset headers) or 5xx.
async fn send_with_retry(req: reqwest::RequestBuilder, label: &str) -> anyhow::Result<reqwest::Response> {
	let retry_builder = req.try_clone();
	let resp = req.send().await.with_context(|| format!("helix {label} send"))?;
	let status = resp.status();

	if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
		let body = resp.text().await.unwrap_or_default();
		anyhow::bail!("helix {label} auth failed (status={status}) body={body}");
	}

	if status == StatusCode::TOO_MANY_REQUESTS
		&& let Some(delay) = retry_delay_from_headers(resp.headers())
		&& let Some(retry) = retry_builder
	{
		tokio::time::sleep(delay).await;
		return retry.send().await.with_context(|| format!("helix {label} retry send"));
	}

	if status.is_server_error()
		&& let Some(retry) = retry_builder
	{
		tokio::time::sleep(Duration::from_millis(250)).await;
		return retry.send().await.with_context(|| format!("helix {label} retry send"));
	}

	Ok(resp)
}

/// Result of `GET /oauth2/validate`.
#[derive(Debug, Clone, Deserialize)]
pub struct TwitchTokenValidation {
	pub client_id: String,
	#[serde(default)]
	pub login: String,
	#[serde(default)]
	pub user_id: String,
	#[serde(default)]
	pub expires_in: u64,
	#[serde(default)]
	pub scopes: Vec<String>,
}

impl TwitchTokenValidation {
	pub fn has_scope(&self, scope: &str) -> bool {
		self.scopes.iter().any(|s| s == scope)
	}
}

/// Validate a user token against the identity service.
pub async fn validate_user_token(id_base_url: &str, access_token: &str) -> anyhow::Result<TwitchTokenValidation> {
	let url = Url::parse(id_base_url)
		.and_then(|u| u.join(TOKEN_VALIDATE_PATH))
		.context("build token validate url")?;

	let http = reqwest::Client::builder()
		.user_agent("duochat/0.x (oauth-validate)")
		.build()
		.context("build reqwest client")?;

	let resp = http
		.get(url)
		.header("Authorization", format!("OAuth {access_token}"))
		.send()
		.await
		.context("twitch validate token request")?;

	let status = resp.status();
	let body = resp.text().await.context("twitch validate token read body")?;

	if !status.is_success() {
		anyhow::bail!("twitch validate token failed: status={status} body={body}");
	}

	serde_json::from_str(&body).context("twitch validate token parse json")
}

#[derive(Debug, Deserialize)]
pub(crate) struct HelixData<T> {
	pub(crate) data: Vec<T>,
	#[serde(default)]
	pub(crate) pagination: Option<HelixPagination>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HelixPagination {
	#[serde(default)]
	pub(crate) cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HelixModerator {
	pub(crate) user_id: String,
	#[allow(dead_code)]
	#[serde(default)]
	pub(crate) user_login: String,
}

/// Raw cheermote entry; images are nested `theme → format → scale → url`.
#[derive(Debug, Deserialize)]
pub(crate) struct HelixCheermote {
	pub(crate) prefix: String,
	pub(crate) tiers: Vec<HelixCheermoteTier>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HelixCheermoteTier {
	pub(crate) id: String,
	pub(crate) min_bits: u64,
	#[serde(default)]
	pub(crate) color: String,
	#[serde(default)]
	pub(crate) can_cheer: bool,
	#[serde(default)]
	pub(crate) images: BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>,
}

impl From<HelixCheermote> for CheermoteSet {
	fn from(c: HelixCheermote) -> Self {
		let tiers = c
			.tiers
			.into_iter()
			.map(|t| {
				let mut images = Vec::new();
				for (theme, formats) in t.images {
					for (format, scales) in formats {
						for (scale, url) in scales {
							images.push(CheermoteImage {
								theme: theme.clone(),
								format: format.clone(),
								scale,
								url,
							});
						}
					}
				}
				CheermoteTier {
					id: t.id,
					min_bits: t.min_bits,
					color: t.color,
					can_cheer: t.can_cheer,
					images,
				}
			})
			.collect();

		CheermoteSet { prefix: c.prefix, tiers }
	}
}

#[derive(Debug, Serialize)]
struct HelixChatMessageCondition<'a> {
	broadcaster_user_id: &'a str,
	user_id: &'a str,
}

#[derive(Debug, Serialize)]
struct HelixWebsocketTransport<'a> {
	method: &'a str,
	session_id: &'a str,
}

#[derive(Debug, Serialize)]
struct HelixCreateSubscriptionRequest<'a, TCondition> {
	r#type: &'a str,
	version: &'a str,
	condition: TCondition,
	transport: HelixWebsocketTransport<'a>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HelixSubscriptionData {
	pub(crate) id: String,
	#[serde(default)]
	pub(crate) status: String,
}

/// Authenticated Helix client for one bot token.
#[derive(Clone, Debug)]
pub(crate) struct HelixClient {
	http: reqwest::Client,
	base_url: Url,
	client_id: String,
	bearer_token: String,
}

impl HelixClient {
	pub(crate) fn new(base_url: Url, client_id: String, bearer_token: String) -> anyhow::Result<Self> {
		let http = reqwest::Client::builder()
			.user_agent(USER_AGENT)
			.build()
			.context("build reqwest client")?;

		Ok(Self {
			http,
			base_url,
			client_id,
			bearer_token,
		})
	}

	fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
		req.header("Client-Id", &self.client_id)
			.header("Authorization", format!("Bearer {}", self.bearer_token))
	}

	fn url(&self, path_and_query: &str) -> anyhow::Result<Url> {
		self.base_url.join(path_and_query).context("join helix url")
	}

	async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str, label: &str) -> anyhow::Result<T> {
		let url = self.url(path_and_query)?;
		let resp = send_with_retry(self.authed(self.http.get(url)), label).await?;

		let status = resp.status();
		let body = resp.text().await.with_context(|| format!("helix {label} read body"))?;
		if !status.is_success() {
			anyhow::bail!("helix {label} failed: status={status} body={body}");
		}

		serde_json::from_str(&body).with_context(|| format!("helix {label} parse json"))
	}

	/// Register `channel.chat.message` v1 on a websocket session. Twitch answers 202 on success.
	pub(crate) async fn create_chat_message_subscription(
		&self,
		session_id: &str,
		broadcaster_user_id: &str,
		user_id: &str,
	) -> anyhow::Result<HelixSubscriptionData> {
		let url = self.url(EVENTSUB_SUBSCRIPTIONS_PATH)?;
		let req = HelixCreateSubscriptionRequest {
			r#type: "channel.chat.message",
			version: "1",
			condition: HelixChatMessageCondition {
				broadcaster_user_id,
				user_id,
			},
			transport: HelixWebsocketTransport {
				method: "websocket",
				session_id,
			},
		};

		let resp = send_with_retry(self.authed(self.http.post(url)).json(&req), "POST eventsub/subscriptions").await?;

		let status = resp.status();
		let body = resp.text().await.context("helix POST eventsub/subscriptions read body")?;
		if status != StatusCode::ACCEPTED {
			anyhow::bail!("helix create subscription failed: status={status} body={body}");
		}

		let parsed: HelixData<HelixSubscriptionData> =
			serde_json::from_str(&body).context("helix create subscription parse json")?;
		parsed
			.data
			.into_iter()
			.next()
			.context("helix create subscription returned empty data")
	}

	pub(crate) async fn channel_badges(&self, broadcaster_id: &str) -> anyhow::Result<Vec<BadgeSet>> {
		let path = format!("{CHAT_BADGES_PATH}?broadcaster_id={}", urlencoding::encode(broadcaster_id));
		let parsed: HelixData<BadgeSet> = self.get_json(&path, "GET chat/badges").await?;
		Ok(parsed.data)
	}

	pub(crate) async fn global_badges(&self) -> anyhow::Result<Vec<BadgeSet>> {
		let parsed: HelixData<BadgeSet> = self.get_json(CHAT_BADGES_GLOBAL_PATH, "GET chat/badges/global").await?;
		Ok(parsed.data)
	}

	pub(crate) async fn cheermotes(&self, broadcaster_id: &str) -> anyhow::Result<Vec<CheermoteSet>> {
		let path = format!("{CHEERMOTES_PATH}?broadcaster_id={}", urlencoding::encode(broadcaster_id));
		let parsed: HelixData<HelixCheermote> = self.get_json(&path, "GET bits/cheermotes").await?;
		Ok(parsed.data.into_iter().map(Into::into).collect())
	}

	/// All moderator user ids of a channel, following pagination.
	pub(crate) async fn moderator_ids(&self, broadcaster_id: &str) -> anyhow::Result<Vec<String>> {
		let mut out = Vec::new();
		let mut cursor: Option<String> = None;

		loop {
			let mut path = format!(
				"{MODERATORS_PATH}?broadcaster_id={}&first=100",
				urlencoding::encode(broadcaster_id)
			);
			if let Some(c) = &cursor {
				path.push_str(&format!("&after={}", urlencoding::encode(c)));
			}

			let page: HelixData<HelixModerator> = self.get_json(&path, "GET moderation/moderators").await?;
			out.extend(page.data.into_iter().map(|m| m.user_id));

			cursor = page.pagination.and_then(|p| p.cursor).filter(|c| !c.is_empty());
			if cursor.is_none() {
				break;
			}
		}

		Ok(out)
	}
}

#[cfg(test)]
#[path = "helix_tests.rs"]
mod tests;
