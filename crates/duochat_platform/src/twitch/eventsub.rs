#![forbid(unsafe_code)]

use std::collections::HashSet;

use anyhow::Context;
use duochat_domain::{BadgeRef, Cheermote, Fragment, Platform, RawChatEvent, RawExtra, RawUser};
use serde::Deserialize;

/// Cheap peek at `metadata.message_type` / `metadata.subscription_type`.
#[derive(Debug, Deserialize)]
pub(crate) struct EventSubMetadataPeek {
	pub(crate) metadata: EventSubMetadataPeekInner,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EventSubMetadataPeekInner {
	pub(crate) message_type: String,
	#[serde(default)]
	pub(crate) subscription_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EventSubWelcomeMessage {
	pub(crate) payload: EventSubSessionPayload<EventSubWelcomeSession>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EventSubReconnectMessage {
	pub(crate) payload: EventSubSessionPayload<EventSubReconnectSession>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EventSubSessionPayload<TSession> {
	pub(crate) session: TSession,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EventSubWelcomeSession {
	pub(crate) id: String,
	#[serde(default)]
	pub(crate) keepalive_timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EventSubReconnectSession {
	pub(crate) reconnect_url: String,
}

#[derive(Debug, Deserialize)]
struct EventSubNotification<TEvent> {
	payload: EventSubNotificationPayload<TEvent>,
}

#[derive(Debug, Deserialize)]
struct EventSubNotificationPayload<TEvent> {
	event: TEvent,
}

#[derive(Debug, Deserialize)]
struct ChannelChatMessageEvent {
	broadcaster_user_id: String,
	chatter_user_id: String,
	chatter_user_name: String,
	message: ChannelChatMessageContent,
	#[serde(default)]
	badges: Vec<ChannelChatBadge>,
}

#[derive(Debug, Deserialize)]
struct ChannelChatBadge {
	set_id: String,
	id: String,
}

#[derive(Debug, Deserialize)]
struct ChannelChatMessageContent {
	text: String,
	#[serde(default)]
	fragments: Vec<ChannelChatMessageFragment>,
}

#[derive(Debug, Deserialize)]
struct ChannelChatMessageFragment {
	#[serde(rename = "type")]
	kind: String,
	text: String,
	#[serde(default)]
	cheermote: Option<FragmentCheermote>,
	#[serde(default)]
	emote: Option<FragmentEmote>,
	#[serde(default)]
	mention: Option<FragmentMention>,
}

#[derive(Debug, Deserialize)]
struct FragmentCheermote {
	prefix: String,
	bits: u64,
	#[serde(default)]
	tier: u64,
}

#[derive(Debug, Deserialize)]
struct FragmentEmote {
	id: String,
}

#[derive(Debug, Deserialize)]
struct FragmentMention {
	user_login: String,
}

pub(crate) fn peek(raw_json: &str) -> anyhow::Result<EventSubMetadataPeekInner> {
	let peek: EventSubMetadataPeek = serde_json::from_str(raw_json).context("parse EventSub metadata peek")?;
	Ok(peek.metadata)
}

pub(crate) fn parse_welcome(raw_json: &str) -> anyhow::Result<EventSubWelcomeSession> {
	let msg: EventSubWelcomeMessage = serde_json::from_str(raw_json).context("parse EventSub session_welcome")?;
	Ok(msg.payload.session)
}

pub(crate) fn parse_reconnect(raw_json: &str) -> anyhow::Result<EventSubReconnectSession> {
	let msg: EventSubReconnectMessage = serde_json::from_str(raw_json).context("parse EventSub session_reconnect")?;
	Ok(msg.payload.session)
}

fn map_fragment(f: ChannelChatMessageFragment) -> Fragment {
	match (f.kind.as_str(), f.cheermote, f.emote, f.mention) {
		("cheermote", Some(c), _, _) => Fragment::Cheermote {
			text: f.text,
			cheermote: Cheermote {
				prefix: c.prefix,
				bits: c.bits,
				tier: c.tier,
			},
			resolved: None,
		},
		("emote", _, Some(e), _) => Fragment::Emote { text: f.text, id: e.id },
		("mention", _, _, Some(m)) => Fragment::Mention {
			text: f.text,
			user_login: m.user_login,
		},
		_ => Fragment::Text { text: f.text },
	}
}

/// Normalize a `channel.chat.message` notification.
///
/// Returns `Ok(None)` for any other message type. `moderators` holds chatter user ids; an empty set means
/// moderator lookup is disabled and nobody is flagged.
pub(crate) fn try_normalize_chat_message(
	raw_json: &str,
	moderators: &HashSet<String>,
) -> anyhow::Result<Option<RawChatEvent>> {
	let meta = peek(raw_json)?;
	if meta.message_type != "notification" || meta.subscription_type.as_deref() != Some("channel.chat.message") {
		return Ok(None);
	}

	let msg: EventSubNotification<ChannelChatMessageEvent> =
		serde_json::from_str(raw_json).context("parse channel.chat.message notification")?;
	let ev = msg.payload.event;

	Ok(Some(RawChatEvent {
		user: RawUser {
			username: ev.chatter_user_name,
			is_mod: moderators.contains(&ev.chatter_user_id),
			is_streamer: ev.broadcaster_user_id == ev.chatter_user_id,
		},
		source: Platform::Twitch,
		message: Some(ev.message.text),
		extra: RawExtra {
			fragments: ev.message.fragments.into_iter().map(map_fragment).collect(),
			badges: ev
				.badges
				.into_iter()
				.map(|b| BadgeRef { set_id: b.set_id, id: b.id })
				.collect(),
		},
	}))
}

#[cfg(test)]
#[path = "eventsub_tests.rs"]
mod tests;
