//! Wire messages (`duochat.v1`).
//!
//! Every frame on the control stream carries exactly one [`Envelope`].

#![forbid(unsafe_code)]

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Envelope {
	#[prost(uint32, tag = "1")]
	pub version: u32,
	/// Echoed back on responses to a client request; empty on server pushes.
	#[prost(string, tag = "2")]
	pub request_id: String,
	#[prost(oneof = "envelope::Msg", tags = "10, 11, 12, 13, 14, 15, 16, 17, 18")]
	pub msg: Option<envelope::Msg>,
}

pub mod envelope {
	#[derive(Clone, PartialEq, ::prost::Oneof)]
	pub enum Msg {
		#[prost(message, tag = "10")]
		Hello(super::Hello),
		#[prost(message, tag = "11")]
		Welcome(super::Welcome),
		#[prost(message, tag = "12")]
		Sync(super::Sync),
		#[prost(message, tag = "13")]
		AddMessage(super::AddMessage),
		#[prost(message, tag = "14")]
		DeleteMessage(super::DeleteMessage),
		#[prost(message, tag = "15")]
		StreamMessages(super::StreamMessages),
		#[prost(message, tag = "16")]
		StreamMessage(super::StreamMessage),
		#[prost(message, tag = "17")]
		MessageRemoved(super::MessageRemoved),
		#[prost(message, tag = "18")]
		Error(super::Error),
	}
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Hello {
	#[prost(string, tag = "1")]
	pub client_name: String,
	#[prost(uint32, tag = "2")]
	pub protocol_version: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Welcome {
	#[prost(string, tag = "1")]
	pub server_name: String,
	#[prost(uint32, tag = "2")]
	pub protocol_version: u32,
	#[prost(uint32, tag = "3")]
	pub history_capacity: u32,
	#[prost(uint64, tag = "4")]
	pub conn_id: u64,
}

/// Ask for the full history.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Sync {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddMessage {
	#[prost(message, optional, tag = "1")]
	pub event: Option<RawChatEvent>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteMessage {
	#[prost(string, tag = "1")]
	pub id: String,
}

/// Full history, oldest first. A history too large for one frame spans several; all but the last set `more`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamMessages {
	#[prost(message, repeated, tag = "1")]
	pub messages: Vec<ChatMessage>,
	#[prost(bool, tag = "2")]
	pub more: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamMessage {
	#[prost(message, optional, tag = "1")]
	pub message: Option<ChatMessage>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessageRemoved {
	#[prost(string, tag = "1")]
	pub id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Error {
	#[prost(enumeration = "ErrorCode", tag = "1")]
	pub code: i32,
	#[prost(string, tag = "2")]
	pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ErrorCode {
	Unspecified = 0,
	BadRequest = 1,
	UnsupportedVersion = 2,
	Internal = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Platform {
	Unspecified = 0,
	Twitch = 1,
	Youtube = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Rank {
	/// No rank held.
	None = 0,
	First = 1,
	Second = 2,
	Third = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum FragmentKind {
	Text = 0,
	Cheermote = 1,
	Emote = 2,
	Mention = 3,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChatMessage {
	#[prost(string, tag = "1")]
	pub id: String,
	#[prost(string, tag = "2")]
	pub text: String,
	#[prost(message, optional, tag = "3")]
	pub user: Option<ChatUser>,
	#[prost(int64, tag = "4")]
	pub timestamp_ms: i64,
	#[prost(enumeration = "Platform", tag = "5")]
	pub source: i32,
	#[prost(message, repeated, tag = "6")]
	pub fragments: Vec<Fragment>,
	#[prost(message, repeated, tag = "7")]
	pub badges: Vec<Badge>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChatUser {
	#[prost(string, tag = "1")]
	pub username: String,
	#[prost(enumeration = "Rank", tag = "2")]
	pub rank: i32,
	#[prost(bool, tag = "3")]
	pub is_moderator: bool,
	#[prost(bool, tag = "4")]
	pub is_streamer: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Fragment {
	#[prost(enumeration = "FragmentKind", tag = "1")]
	pub kind: i32,
	#[prost(string, tag = "2")]
	pub text: String,
	#[prost(message, optional, tag = "3")]
	pub cheermote: Option<Cheermote>,
	/// Emote id for `EMOTE`.
	#[prost(string, tag = "4")]
	pub emote_id: String,
	/// Mentioned login for `MENTION`.
	#[prost(string, tag = "5")]
	pub user_login: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Cheermote {
	#[prost(string, tag = "1")]
	pub prefix: String,
	#[prost(uint64, tag = "2")]
	pub bits: u64,
	#[prost(uint64, tag = "3")]
	pub tier: u64,
	#[prost(message, optional, tag = "4")]
	pub resolved: Option<CheermoteTier>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheermoteTier {
	#[prost(string, tag = "1")]
	pub id: String,
	#[prost(uint64, tag = "2")]
	pub min_bits: u64,
	#[prost(string, tag = "3")]
	pub color: String,
	#[prost(bool, tag = "4")]
	pub can_cheer: bool,
	#[prost(message, repeated, tag = "5")]
	pub images: Vec<CheermoteImage>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheermoteImage {
	#[prost(string, tag = "1")]
	pub theme: String,
	#[prost(string, tag = "2")]
	pub format: String,
	#[prost(string, tag = "3")]
	pub scale: String,
	#[prost(string, tag = "4")]
	pub url: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Badge {
	#[prost(string, tag = "1")]
	pub set_id: String,
	#[prost(string, tag = "2")]
	pub id: String,
	#[prost(message, optional, tag = "3")]
	pub data: Option<BadgeVersion>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BadgeVersion {
	#[prost(string, tag = "1")]
	pub id: String,
	#[prost(string, tag = "2")]
	pub title: String,
	#[prost(string, tag = "3")]
	pub description: String,
	#[prost(string, tag = "4")]
	pub image_url_1x: String,
	#[prost(string, tag = "5")]
	pub image_url_2x: String,
	#[prost(string, tag = "6")]
	pub image_url_4x: String,
	#[prost(string, optional, tag = "7")]
	pub click_action: Option<String>,
	#[prost(string, optional, tag = "8")]
	pub click_url: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RawUser {
	#[prost(string, tag = "1")]
	pub username: String,
	#[prost(bool, tag = "2")]
	pub is_mod: bool,
	#[prost(bool, tag = "3")]
	pub is_streamer: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RawChatEvent {
	#[prost(message, optional, tag = "1")]
	pub user: Option<RawUser>,
	#[prost(enumeration = "Platform", tag = "2")]
	pub source: i32,
	#[prost(string, optional, tag = "3")]
	pub message: Option<String>,
	#[prost(message, repeated, tag = "4")]
	pub fragments: Vec<Fragment>,
	#[prost(message, repeated, tag = "5")]
	pub badges: Vec<BadgeRef>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BadgeRef {
	#[prost(string, tag = "1")]
	pub set_id: String,
	#[prost(string, tag = "2")]
	pub id: String,
}
