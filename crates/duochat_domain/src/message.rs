#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::{BadgeVersion, CheermoteTier, MessageId, Platform, Rank};

/// Author of a committed chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
	pub username: String,
	#[serde(default)]
	pub rank: Option<Rank>,
	#[serde(default)]
	pub is_moderator: bool,
	#[serde(default)]
	pub is_streamer: bool,
}

impl ChatUser {
	pub fn new(username: impl Into<String>) -> Self {
		Self {
			username: username.into(),
			rank: None,
			is_moderator: false,
			is_streamer: false,
		}
	}
}

/// Bits marker carried by a cheermote fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cheermote {
	pub prefix: String,
	pub bits: u64,
	/// Platform-reported tier; the resolved tier lives on the fragment.
	#[serde(default)]
	pub tier: u64,
}

/// Typed segment of message text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fragment {
	Text {
		text: String,
	},
	Cheermote {
		text: String,
		cheermote: Cheermote,
		#[serde(default)]
		resolved: Option<CheermoteTier>,
	},
	Emote {
		text: String,
		id: String,
	},
	Mention {
		text: String,
		user_login: String,
	},
}

impl Fragment {
	pub fn text(text: impl Into<String>) -> Self {
		Self::Text { text: text.into() }
	}

	/// Unresolved cheermote fragment.
	pub fn cheermote(text: impl Into<String>, prefix: impl Into<String>, bits: u64) -> Self {
		Self::Cheermote {
			text: text.into(),
			cheermote: Cheermote {
				prefix: prefix.into(),
				bits,
				tier: 0,
			},
			resolved: None,
		}
	}

	/// Display text of this fragment.
	pub fn as_text(&self) -> &str {
		match self {
			Self::Text { text }
			| Self::Cheermote { text, .. }
			| Self::Emote { text, .. }
			| Self::Mention { text, .. } => text,
		}
	}
}

/// Badge reference as reported by a platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeRef {
	pub set_id: String,
	pub id: String,
}

/// Badge attached to a committed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
	pub set_id: String,
	pub id: String,
	#[serde(default)]
	pub data: Option<BadgeVersion>,
}

impl Badge {
	pub fn unresolved(r: BadgeRef) -> Self {
		Self {
			set_id: r.set_id,
			id: r.id,
			data: None,
		}
	}
}

/// A message committed to the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
	pub id: MessageId,
	pub text: String,
	pub user: ChatUser,
	/// Milliseconds since the unix epoch, taken at ingestion.
	pub timestamp_ms: i64,
	pub source: Platform,
	#[serde(default)]
	pub fragments: Vec<Fragment>,
	#[serde(default)]
	pub badges: Vec<Badge>,
}

/// Author flags as reported by the source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawUser {
	pub username: String,
	#[serde(default)]
	pub is_mod: bool,
	#[serde(default)]
	pub is_streamer: bool,
}

/// Source-specific payload accompanying a raw event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawExtra {
	#[serde(default)]
	pub fragments: Vec<Fragment>,
	#[serde(default)]
	pub badges: Vec<BadgeRef>,
}

/// Normalized event handed from a source adapter to the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChatEvent {
	pub user: RawUser,
	pub source: Platform,
	#[serde(default)]
	pub message: Option<String>,
	#[serde(default)]
	pub extra: RawExtra,
}

impl RawChatEvent {
	/// Plain-text event with no fragments or badges.
	pub fn text(source: Platform, username: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			user: RawUser {
				username: username.into(),
				..RawUser::default()
			},
			source,
			message: Some(message.into()),
			extra: RawExtra::default(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fragment_tagged_json() {
		let json = r#"{"type":"cheermote","text":"Cheer100","cheermote":{"prefix":"Cheer","bits":100,"tier":100}}"#;
		let frag: Fragment = serde_json::from_str(json).unwrap();
		match &frag {
			Fragment::Cheermote { cheermote, resolved, .. } => {
				assert_eq!(cheermote.prefix, "Cheer");
				assert_eq!(cheermote.bits, 100);
				assert!(resolved.is_none());
			}
			other => panic!("unexpected fragment: {other:?}"),
		}
		assert_eq!(frag.as_text(), "Cheer100");
	}

	#[test]
	fn raw_event_defaults_missing_extra() {
		let json = r#"{"user":{"username":"alice"},"source":"Twitch","message":"hi"}"#;
		let ev: RawChatEvent = serde_json::from_str(json).unwrap();
		assert_eq!(ev, RawChatEvent::text(Platform::Twitch, "alice", "hi"));
		assert!(!ev.user.is_mod);
	}
}
