#![forbid(unsafe_code)]

//! Domain ↔ wire conversions.

use duochat_domain as dom;
use prost::Message as _;
use thiserror::Error;

use crate::pb;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConvertError {
	#[error("missing field: {0}")]
	Missing(&'static str),
	#[error("unknown platform value: {0}")]
	UnknownPlatform(i32),
	#[error("invalid message id: {0}")]
	InvalidId(#[from] dom::ParseError),
	#[error("cheermote fragment without cheermote data")]
	CheermoteMissing,
}

impl From<dom::Platform> for pb::Platform {
	fn from(p: dom::Platform) -> Self {
		match p {
			dom::Platform::Twitch => pb::Platform::Twitch,
			dom::Platform::YouTube => pb::Platform::Youtube,
		}
	}
}

fn platform_from_wire(v: i32) -> Result<dom::Platform, ConvertError> {
	match pb::Platform::try_from(v) {
		Ok(pb::Platform::Twitch) => Ok(dom::Platform::Twitch),
		Ok(pb::Platform::Youtube) => Ok(dom::Platform::YouTube),
		_ => Err(ConvertError::UnknownPlatform(v)),
	}
}

fn rank_to_wire(rank: Option<dom::Rank>) -> pb::Rank {
	match rank {
		None => pb::Rank::None,
		Some(dom::Rank::First) => pb::Rank::First,
		Some(dom::Rank::Second) => pb::Rank::Second,
		Some(dom::Rank::Third) => pb::Rank::Third,
	}
}

fn rank_from_wire(v: i32) -> Option<dom::Rank> {
	match pb::Rank::try_from(v).ok()? {
		pb::Rank::None => None,
		pb::Rank::First => Some(dom::Rank::First),
		pb::Rank::Second => Some(dom::Rank::Second),
		pb::Rank::Third => Some(dom::Rank::Third),
	}
}

impl From<&dom::CheermoteTier> for pb::CheermoteTier {
	fn from(t: &dom::CheermoteTier) -> Self {
		Self {
			id: t.id.clone(),
			min_bits: t.min_bits,
			color: t.color.clone(),
			can_cheer: t.can_cheer,
			images: t
				.images
				.iter()
				.map(|i| pb::CheermoteImage {
					theme: i.theme.clone(),
					format: i.format.clone(),
					scale: i.scale.clone(),
					url: i.url.clone(),
				})
				.collect(),
		}
	}
}

impl From<pb::CheermoteTier> for dom::CheermoteTier {
	fn from(t: pb::CheermoteTier) -> Self {
		Self {
			id: t.id,
			min_bits: t.min_bits,
			color: t.color,
			can_cheer: t.can_cheer,
			images: t
				.images
				.into_iter()
				.map(|i| dom::CheermoteImage {
					theme: i.theme,
					format: i.format,
					scale: i.scale,
					url: i.url,
				})
				.collect(),
		}
	}
}

impl From<&dom::Fragment> for pb::Fragment {
	fn from(f: &dom::Fragment) -> Self {
		let mut out = pb::Fragment {
			text: f.as_text().to_string(),
			..Default::default()
		};
		match f {
			dom::Fragment::Text { .. } => out.set_kind(pb::FragmentKind::Text),
			dom::Fragment::Cheermote { cheermote, resolved, .. } => {
				out.set_kind(pb::FragmentKind::Cheermote);
				out.cheermote = Some(pb::Cheermote {
					prefix: cheermote.prefix.clone(),
					bits: cheermote.bits,
					tier: cheermote.tier,
					resolved: resolved.as_ref().map(Into::into),
				});
			}
			dom::Fragment::Emote { id, .. } => {
				out.set_kind(pb::FragmentKind::Emote);
				out.emote_id = id.clone();
			}
			dom::Fragment::Mention { user_login, .. } => {
				out.set_kind(pb::FragmentKind::Mention);
				out.user_login = user_login.clone();
			}
		}
		out
	}
}

impl TryFrom<pb::Fragment> for dom::Fragment {
	type Error = ConvertError;

	fn try_from(f: pb::Fragment) -> Result<Self, Self::Error> {
		Ok(match f.kind() {
			pb::FragmentKind::Text => dom::Fragment::Text { text: f.text },
			pb::FragmentKind::Cheermote => {
				let c = f.cheermote.ok_or(ConvertError::CheermoteMissing)?;
				dom::Fragment::Cheermote {
					text: f.text,
					cheermote: dom::Cheermote {
						prefix: c.prefix,
						bits: c.bits,
						tier: c.tier,
					},
					resolved: c.resolved.map(Into::into),
				}
			}
			pb::FragmentKind::Emote => dom::Fragment::Emote {
				text: f.text,
				id: f.emote_id,
			},
			pb::FragmentKind::Mention => dom::Fragment::Mention {
				text: f.text,
				user_login: f.user_login,
			},
		})
	}
}

impl From<&dom::BadgeVersion> for pb::BadgeVersion {
	fn from(v: &dom::BadgeVersion) -> Self {
		Self {
			id: v.id.clone(),
			title: v.title.clone(),
			description: v.description.clone(),
			image_url_1x: v.image_url_1x.clone(),
			image_url_2x: v.image_url_2x.clone(),
			image_url_4x: v.image_url_4x.clone(),
			click_action: v.click_action.clone(),
			click_url: v.click_url.clone(),
		}
	}
}

impl From<pb::BadgeVersion> for dom::BadgeVersion {
	fn from(v: pb::BadgeVersion) -> Self {
		Self {
			id: v.id,
			title: v.title,
			description: v.description,
			image_url_1x: v.image_url_1x,
			image_url_2x: v.image_url_2x,
			image_url_4x: v.image_url_4x,
			click_action: v.click_action,
			click_url: v.click_url,
		}
	}
}

impl From<&dom::ChatMessage> for pb::ChatMessage {
	fn from(m: &dom::ChatMessage) -> Self {
		let mut out = pb::ChatMessage {
			id: m.id.to_string(),
			text: m.text.clone(),
			user: Some(pb::ChatUser {
				username: m.user.username.clone(),
				rank: rank_to_wire(m.user.rank) as i32,
				is_moderator: m.user.is_moderator,
				is_streamer: m.user.is_streamer,
			}),
			timestamp_ms: m.timestamp_ms,
			source: 0,
			fragments: m.fragments.iter().map(Into::into).collect(),
			badges: m
				.badges
				.iter()
				.map(|b| pb::Badge {
					set_id: b.set_id.clone(),
					id: b.id.clone(),
					data: b.data.as_ref().map(Into::into),
				})
				.collect(),
		};
		out.set_source(m.source.into());
		out
	}
}

impl TryFrom<pb::ChatMessage> for dom::ChatMessage {
	type Error = ConvertError;

	fn try_from(m: pb::ChatMessage) -> Result<Self, Self::Error> {
		let user = m.user.ok_or(ConvertError::Missing("user"))?;
		Ok(Self {
			id: m.id.parse()?,
			text: m.text,
			user: dom::ChatUser {
				username: user.username,
				rank: rank_from_wire(user.rank),
				is_moderator: user.is_moderator,
				is_streamer: user.is_streamer,
			},
			timestamp_ms: m.timestamp_ms,
			source: platform_from_wire(m.source)?,
			fragments: m
				.fragments
				.into_iter()
				.map(TryInto::try_into)
				.collect::<Result<_, _>>()?,
			badges: m
				.badges
				.into_iter()
				.map(|b| dom::Badge {
					set_id: b.set_id,
					id: b.id,
					data: b.data.map(Into::into),
				})
				.collect(),
		})
	}
}

impl From<&dom::RawChatEvent> for pb::RawChatEvent {
	fn from(ev: &dom::RawChatEvent) -> Self {
		let mut out = pb::RawChatEvent {
			user: Some(pb::RawUser {
				username: ev.user.username.clone(),
				is_mod: ev.user.is_mod,
				is_streamer: ev.user.is_streamer,
			}),
			source: 0,
			message: ev.message.clone(),
			fragments: ev.extra.fragments.iter().map(Into::into).collect(),
			badges: ev
				.extra
				.badges
				.iter()
				.map(|b| pb::BadgeRef {
					set_id: b.set_id.clone(),
					id: b.id.clone(),
				})
				.collect(),
		};
		out.set_source(ev.source.into());
		out
	}
}

impl TryFrom<pb::RawChatEvent> for dom::RawChatEvent {
	type Error = ConvertError;

	fn try_from(ev: pb::RawChatEvent) -> Result<Self, Self::Error> {
		let user = ev.user.ok_or(ConvertError::Missing("user"))?;
		Ok(Self {
			user: dom::RawUser {
				username: user.username,
				is_mod: user.is_mod,
				is_streamer: user.is_streamer,
			},
			source: platform_from_wire(ev.source)?,
			message: ev.message,
			extra: dom::RawExtra {
				fragments: ev
					.fragments
					.into_iter()
					.map(TryInto::try_into)
					.collect::<Result<_, _>>()?,
				badges: ev
					.badges
					.into_iter()
					.map(|b| dom::BadgeRef { set_id: b.set_id, id: b.id })
					.collect(),
			},
		})
	}
}

/// Wrap a payload in a versioned envelope.
pub fn envelope(msg: pb::envelope::Msg) -> pb::Envelope {
	pb::Envelope {
		version: crate::version::PROTOCOL_VERSION,
		request_id: String::new(),
		msg: Some(msg),
	}
}

pub fn stream_messages(history: &[dom::ChatMessage]) -> pb::Envelope {
	envelope(pb::envelope::Msg::StreamMessages(pb::StreamMessages {
		messages: history.iter().map(Into::into).collect(),
		more: false,
	}))
}

/// History split into `StreamMessages` envelopes whose bodies each fit in `max_frame_size`.
#[derive(Debug)]
pub struct HistoryFrames {
	/// At least one envelope, even for an empty history.
	pub frames: Vec<pb::Envelope>,
	/// Messages left out because no frame could hold them.
	pub oversized: usize,
}

/// Room for the oneof length prefix to grow as messages are added.
const HISTORY_FRAME_SLACK: usize = 8;

/// Pack `history` oldest first into as few frames as fit, each tagged with `request_id`.
pub fn stream_messages_chunked(history: &[dom::ChatMessage], request_id: &str, max_frame_size: usize) -> HistoryFrames {
	let frame = |messages: Vec<pb::ChatMessage>, more: bool| pb::Envelope {
		request_id: request_id.to_string(),
		..envelope(pb::envelope::Msg::StreamMessages(pb::StreamMessages { messages, more }))
	};

	let overhead = frame(Vec::new(), true).encoded_len() + HISTORY_FRAME_SLACK;
	let budget = max_frame_size.saturating_sub(overhead);

	let mut batches: Vec<Vec<pb::ChatMessage>> = Vec::new();
	let mut batch = Vec::new();
	let mut used = 0;
	let mut oversized = 0;

	for message in history {
		let wire = pb::ChatMessage::from(message);
		let body = wire.encoded_len();
		// key byte + length prefix + body
		let len = 1 + prost::length_delimiter_len(body) + body;
		if len > budget {
			oversized += 1;
			continue;
		}
		if used + len > budget {
			batches.push(std::mem::take(&mut batch));
			used = 0;
		}
		used += len;
		batch.push(wire);
	}
	batches.push(batch);

	let last = batches.len() - 1;
	HistoryFrames {
		frames: batches
			.into_iter()
			.enumerate()
			.map(|(i, messages)| frame(messages, i < last))
			.collect(),
		oversized,
	}
}

pub fn stream_message(message: &dom::ChatMessage) -> pb::Envelope {
	envelope(pb::envelope::Msg::StreamMessage(pb::StreamMessage {
		message: Some(message.into()),
	}))
}

pub fn message_removed(id: dom::MessageId) -> pb::Envelope {
	envelope(pb::envelope::Msg::MessageRemoved(pb::MessageRemoved { id: id.to_string() }))
}

pub fn error(code: pb::ErrorCode, message: impl Into<String>) -> pb::Envelope {
	envelope(pb::envelope::Msg::Error(pb::Error {
		code: code as i32,
		message: message.into(),
	}))
}
