#![forbid(unsafe_code)]

pub mod convert;
pub mod framing;
#[allow(clippy::large_enum_variant)]
pub mod pb;

pub use convert::ConvertError;
pub use framing::{
	DEFAULT_MAX_FRAME_SIZE, FrameDecoder, FramingError, LEN_PREFIX, decode_frame, encode_frame, encode_frame_into,
};

/// Protocol version constants.
pub mod version {
	/// Current protocol major version.
	pub const PROTOCOL_MAJOR: u32 = 1;
	/// Current protocol minor version.
	pub const PROTOCOL_MINOR: u32 = 0;

	/// Compact representation carried in every envelope.
	pub const PROTOCOL_VERSION: u32 = (PROTOCOL_MAJOR << 16) | PROTOCOL_MINOR;

	/// Major version packed in a compact version value.
	pub const fn major(v: u32) -> u32 {
		v >> 16
	}
}

/// ALPN identifier for the QUIC transport.
pub const ALPN: &[u8] = b"duochat-v1";
