#![forbid(unsafe_code)]

use std::time::Duration;

use anyhow::Context;
use duochat_domain::{Fragment, Platform, RawChatEvent, RawExtra, RawUser};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::SecretString;

const USER_AGENT: &str = "duochat/0.x (youtube-live-chat)";

/// Reasons that mean the chat is gone for good.
const TERMINAL_REASONS: &[&str] = &["liveChatEnded", "liveChatNotFound", "liveChatDisabled", "forbidden"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
	pub id: String,
	pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveVideo {
	pub id: String,
	pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchResponse {
	#[serde(default)]
	pub(crate) items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchItem {
	pub(crate) id: SearchItemId,
	#[serde(default)]
	pub(crate) snippet: Option<SearchSnippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchItemId {
	#[serde(default)]
	pub(crate) channel_id: Option<String>,
	#[serde(default)]
	pub(crate) video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchSnippet {
	#[serde(default)]
	pub(crate) title: String,
	#[serde(default)]
	pub(crate) channel_title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VideosResponse {
	#[serde(default)]
	pub(crate) items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VideoItem {
	#[serde(default)]
	pub(crate) live_streaming_details: Option<LiveStreamingDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LiveStreamingDetails {
	#[serde(default)]
	pub(crate) active_live_chat_id: Option<String>,
}

/// One page of `liveChat/messages`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChatPage {
	#[serde(default)]
	pub next_page_token: Option<String>,
	#[serde(default)]
	pub polling_interval_millis: u64,
	#[serde(default)]
	pub offline_at: Option<String>,
	#[serde(default)]
	pub(crate) items: Vec<LiveChatMessageItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LiveChatMessageItem {
	pub(crate) snippet: LiveChatSnippet,
	#[serde(default)]
	pub(crate) author_details: Option<AuthorDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LiveChatSnippet {
	#[serde(rename = "type")]
	pub(crate) kind: String,
	#[serde(default)]
	pub(crate) author_channel_id: String,
	#[serde(default)]
	pub(crate) display_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthorDetails {
	#[serde(default)]
	pub(crate) channel_id: String,
	#[serde(default)]
	pub(crate) display_name: String,
	#[serde(default)]
	pub(crate) is_chat_owner: bool,
	#[serde(default)]
	pub(crate) is_chat_moderator: bool,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
	error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
	#[serde(default)]
	errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
	#[serde(default)]
	reason: String,
}

/// Outcome of one poll.
#[derive(Debug)]
pub enum Poll {
	Page(LiveChatPage),
	/// Chat ended or became unavailable.
	Ended(String),
}

pub(crate) fn error_reason(body: &str) -> Option<String> {
	let parsed: ApiErrorBody = serde_json::from_str(body).ok()?;
	parsed.error.errors.into_iter().map(|e| e.reason).find(|r| !r.is_empty())
}

impl LiveChatPage {
	/// Suggested wait before the next poll, floored at `min`.
	pub fn poll_delay(&self, min: Duration) -> Duration {
		Duration::from_millis(self.polling_interval_millis).max(min)
	}

	/// Chat events on this page, in API order.
	pub fn chat_events(&self, owner_channel_id: &str) -> Vec<RawChatEvent> {
		self.items.iter().filter_map(|item| normalize_item(item, owner_channel_id)).collect()
	}
}

/// Map a live chat item to a feed event. Only text messages carry chat.
pub(crate) fn normalize_item(item: &LiveChatMessageItem, owner_channel_id: &str) -> Option<RawChatEvent> {
	if item.snippet.kind != "textMessageEvent" {
		return None;
	}

	let author = item.author_details.as_ref()?;
	let text = item.snippet.display_message.clone()?;
	let author_channel = if author.channel_id.is_empty() {
		item.snippet.author_channel_id.as_str()
	} else {
		author.channel_id.as_str()
	};

	Some(RawChatEvent {
		user: RawUser {
			username: author.display_name.clone(),
			is_mod: author.is_chat_moderator,
			is_streamer: author.is_chat_owner || (!owner_channel_id.is_empty() && author_channel == owner_channel_id),
		},
		source: Platform::YouTube,
		extra: RawExtra {
			fragments: vec![Fragment::text(text.clone())],
			badges: Vec::new(),
		},
		message: Some(text),
	})
}

/// YouTube Data API v3 client (API key auth).
#[derive(Clone, Debug)]
pub struct YouTubeClient {
	http: reqwest::Client,
	base_url: Url,
	api_key: SecretString,
}

impl YouTubeClient {
	pub fn new(base_url: &str, api_key: SecretString) -> anyhow::Result<Self> {
		let mut base_url = Url::parse(base_url).context("parse youtube api base url")?;
		if !base_url.path().ends_with('/') {
			let path = format!("{}/", base_url.path());
			base_url.set_path(&path);
		}

		let http = reqwest::Client::builder()
			.user_agent(USER_AGENT)
			.build()
			.context("build reqwest client")?;

		Ok(Self { http, base_url, api_key })
	}

	fn url(&self, path: &str, query: &[(&str, &str)]) -> anyhow::Result<Url> {
		let mut url = self.base_url.join(path).context("join youtube url")?;
		{
			let mut pairs = url.query_pairs_mut();
			for (k, v) in query {
				pairs.append_pair(k, v);
			}
			pairs.append_pair("key", self.api_key.expose());
		}
		Ok(url)
	}

	/// Request errors are stripped of their url so the api key never reaches the logs.
	async fn get(&self, path: &str, query: &[(&str, &str)]) -> anyhow::Result<(StatusCode, String)> {
		let url = self.url(path, query)?;
		let resp = self
			.http
			.get(url)
			.send()
			.await
			.map_err(reqwest::Error::without_url)
			.with_context(|| format!("youtube GET {path} send"))?;
		let status = resp.status();
		let body = resp
			.text()
			.await
			.map_err(reqwest::Error::without_url)
			.with_context(|| format!("youtube GET {path} read body"))?;
		Ok((status, body))
	}

	async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> anyhow::Result<T> {
		let (status, body) = self.get(path, query).await?;
		if !status.is_success() {
			anyhow::bail!("youtube GET {path} failed: status={status} body={body}");
		}
		serde_json::from_str(&body).with_context(|| format!("youtube GET {path} parse json"))
	}

	/// First channel matching a search by name.
	pub async fn find_channel(&self, name: &str) -> anyhow::Result<Option<ChannelRef>> {
		let resp: SearchResponse = self
			.get_json(
				"search",
				&[("part", "snippet"), ("type", "channel"), ("maxResults", "1"), ("q", name)],
			)
			.await?;

		Ok(resp.items.into_iter().find_map(|item| {
			let id = item.id.channel_id?;
			let title = item.snippet.map(|s| s.channel_title).unwrap_or_default();
			Some(ChannelRef { id, title })
		}))
	}

	/// The channel's current live broadcast, if any.
	pub async fn find_live_video(&self, channel_id: &str) -> anyhow::Result<Option<LiveVideo>> {
		let resp: SearchResponse = self
			.get_json(
				"search",
				&[
					("part", "snippet"),
					("channelId", channel_id),
					("eventType", "live"),
					("type", "video"),
					("maxResults", "1"),
				],
			)
			.await?;

		Ok(resp.items.into_iter().find_map(|item| {
			let id = item.id.video_id?;
			let title = item.snippet.map(|s| s.title).unwrap_or_default();
			Some(LiveVideo { id, title })
		}))
	}

	pub async fn active_live_chat_id(&self, video_id: &str) -> anyhow::Result<Option<String>> {
		let resp: VideosResponse = self
			.get_json("videos", &[("part", "liveStreamingDetails"), ("id", video_id)])
			.await?;

		Ok(resp
			.items
			.into_iter()
			.find_map(|v| v.live_streaming_details.and_then(|d| d.active_live_chat_id)))
	}

	pub async fn poll_messages(&self, live_chat_id: &str, page_token: Option<&str>) -> anyhow::Result<Poll> {
		let mut query = vec![
			("liveChatId", live_chat_id),
			("part", "snippet,authorDetails"),
			("maxResults", "2000"),
		];
		if let Some(token) = page_token {
			query.push(("pageToken", token));
		}

		let (status, body) = self.get("liveChat/messages", &query).await?;
		if !status.is_success() {
			if let Some(reason) = error_reason(&body)
				&& TERMINAL_REASONS.contains(&reason.as_str())
			{
				return Ok(Poll::Ended(reason));
			}
			anyhow::bail!("youtube GET liveChat/messages failed: status={status} body={body}");
		}

		let page: LiveChatPage = serde_json::from_str(&body).context("youtube liveChat/messages parse json")?;
		if let Some(offline_at) = &page.offline_at {
			return Ok(Poll::Ended(format!("stream offline at {offline_at}")));
		}
		Ok(Poll::Page(page))
	}
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
