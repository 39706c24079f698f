#![forbid(unsafe_code)]

mod message;
mod metadata;

use core::fmt;
use core::str::FromStr;

pub use message::{Badge, BadgeRef, ChatMessage, ChatUser, Cheermote, Fragment, RawChatEvent, RawExtra, RawUser};
pub use metadata::{BadgeSet, BadgeVersion, CheermoteImage, CheermoteSet, CheermoteTier};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chat sources feeding the aggregated feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
	Twitch,
	YouTube,
}

impl Platform {
	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			Platform::Twitch => "twitch",
			Platform::YouTube => "youtube",
		}
	}

	/// Short tag used in log lines.
	pub const fn tag(self) -> &'static str {
		match self {
			Platform::Twitch => "TW",
			Platform::YouTube => "YT",
		}
	}
}

impl fmt::Display for Platform {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
	#[error("empty value")]
	Empty,
	#[error("unknown platform: {0}")]
	UnknownPlatform(String),
	#[error("unknown rank: {0}")]
	UnknownRank(String),
	#[error("invalid message id: {0}")]
	InvalidMessageId(String),
}

impl FromStr for Platform {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseError::Empty);
		}

		match s.to_ascii_lowercase().as_str() {
			"twitch" | "tw" => Ok(Platform::Twitch),
			"youtube" | "you_tube" | "yt" => Ok(Platform::YouTube),
			other => Err(ParseError::UnknownPlatform(other.to_string())),
		}
	}
}

/// Server-assigned message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub uuid::Uuid);

impl MessageId {
	/// Create a new random message id.
	pub fn new_v4() -> Self {
		Self(uuid::Uuid::new_v4())
	}
}

impl fmt::Display for MessageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for MessageId {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseError::Empty);
		}
		uuid::Uuid::parse_str(s)
			.map(Self)
			.map_err(|_| ParseError::InvalidMessageId(s.to_string()))
	}
}

/// Podium rank awarded to the first three distinct chatters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rank {
	First,
	Second,
	Third,
}

impl Rank {
	/// All ranks in assignment priority order.
	pub const ALL: [Rank; 3] = [Rank::First, Rank::Second, Rank::Third];

	/// Number of rank slots.
	pub const COUNT: usize = Self::ALL.len();

	pub const fn index(self) -> usize {
		match self {
			Rank::First => 0,
			Rank::Second => 1,
			Rank::Third => 2,
		}
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Rank::First => "First",
			Rank::Second => "Second",
			Rank::Third => "Third",
		}
	}
}

impl fmt::Display for Rank {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Rank {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"" => Err(ParseError::Empty),
			"first" | "1st" => Ok(Rank::First),
			"second" | "2nd" => Ok(Rank::Second),
			"third" | "3rd" => Ok(Rank::Third),
			other => Err(ParseError::UnknownRank(other.to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn platform_parse_and_display() {
		assert_eq!("twitch".parse::<Platform>().unwrap(), Platform::Twitch);
		assert_eq!("YT".parse::<Platform>().unwrap(), Platform::YouTube);
		assert_eq!("TW".parse::<Platform>().unwrap(), Platform::Twitch);
		assert_eq!(Platform::YouTube.to_string(), "youtube");
		assert!(matches!("kick".parse::<Platform>(), Err(ParseError::UnknownPlatform(_))));
	}

	#[test]
	fn rank_order_matches_index() {
		for (i, rank) in Rank::ALL.iter().enumerate() {
			assert_eq!(rank.index(), i);
		}
		assert!(Rank::First < Rank::Third);
		assert_eq!("2ND".parse::<Rank>().unwrap(), Rank::Second);
	}

	#[test]
	fn rank_serializes_as_name() {
		assert_eq!(serde_json::to_string(&Rank::First).unwrap(), "\"First\"");
	}

	#[test]
	fn message_id_parse() {
		let id = MessageId::new_v4();
		assert_eq!(id.to_string().parse::<MessageId>().unwrap(), id);
		assert!(matches!("nope".parse::<MessageId>(), Err(ParseError::InvalidMessageId(_))));
		assert_eq!("  ".parse::<MessageId>(), Err(ParseError::Empty));
	}
}
