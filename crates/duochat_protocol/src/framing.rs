#![forbid(unsafe_code)]

use bytes::{Buf, BufMut, BytesMut};
use prost::Message;
use thiserror::Error;

/// Length prefix size in bytes (u32, big-endian).
pub const LEN_PREFIX: usize = 4;

/// Default maximum frame payload size.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FramingError {
	#[error("frame exceeds maximum size: len={len} max={max}")]
	FrameTooLarge {
		len: usize,
		max: usize,
	},

	#[error("insufficient data: need={need} have={have}")]
	InsufficientData {
		need: usize,
		have: usize,
	},

	#[error("protobuf decode error: {0}")]
	Decode(#[from] prost::DecodeError),

	#[error("protobuf encode error: {0}")]
	Encode(#[from] prost::EncodeError),
}

fn check_len(len: usize, max: usize) -> Result<(), FramingError> {
	if len > max {
		return Err(FramingError::FrameTooLarge { len, max });
	}
	Ok(())
}

/// Encode a message as `u32 length || protobuf body`.
pub fn encode_frame<M: Message>(msg: &M, max_frame_size: usize) -> Result<Vec<u8>, FramingError> {
	let mut buf = BytesMut::new();
	encode_frame_into(&mut buf, msg, max_frame_size)?;
	Ok(buf.to_vec())
}

/// Append an encoded frame to `buf`.
pub fn encode_frame_into<M: Message>(buf: &mut BytesMut, msg: &M, max_frame_size: usize) -> Result<(), FramingError> {
	let payload_len = msg.encoded_len();
	check_len(payload_len, max_frame_size)?;

	buf.reserve(LEN_PREFIX + payload_len);
	buf.put_u32(payload_len as u32);
	msg.encode(buf)?;
	Ok(())
}

/// Decode one frame from the start of `src`, returning the message and bytes consumed.
pub fn decode_frame<M: Message + Default>(src: &[u8], max_frame_size: usize) -> Result<(M, usize), FramingError> {
	let Some(prefix) = src.get(..LEN_PREFIX) else {
		return Err(FramingError::InsufficientData {
			need: LEN_PREFIX,
			have: src.len(),
		});
	};

	let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
	check_len(len, max_frame_size)?;

	let need = LEN_PREFIX + len;
	let Some(body) = src.get(LEN_PREFIX..need) else {
		return Err(FramingError::InsufficientData { need, have: src.len() });
	};

	Ok((M::decode(body)?, need))
}

/// Incremental decoder for a byte stream carrying back-to-back frames.
#[derive(Debug)]
pub struct FrameDecoder {
	buf: BytesMut,
	max_frame_size: usize,
}

impl Default for FrameDecoder {
	fn default() -> Self {
		Self::new(DEFAULT_MAX_FRAME_SIZE)
	}
}

impl FrameDecoder {
	pub fn new(max_frame_size: usize) -> Self {
		Self {
			buf: BytesMut::with_capacity(8 * 1024),
			max_frame_size,
		}
	}

	/// Buffer bytes read from the stream.
	pub fn extend(&mut self, chunk: &[u8]) {
		self.buf.extend_from_slice(chunk);
	}

	/// Bytes buffered but not yet decoded.
	pub fn buffered(&self) -> usize {
		self.buf.len()
	}

	/// Pop the next complete frame, if one is buffered.
	///
	/// An oversize length prefix is reported before the body arrives so callers can drop the stream early.
	pub fn next_frame<M: Message + Default>(&mut self) -> Result<Option<M>, FramingError> {
		if self.buf.len() < LEN_PREFIX {
			return Ok(None);
		}

		let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
		check_len(len, self.max_frame_size)?;

		if self.buf.len() < LEN_PREFIX + len {
			return Ok(None);
		}

		self.buf.advance(LEN_PREFIX);
		let body = self.buf.split_to(len);
		Ok(Some(M::decode(body.freeze())?))
	}
}
