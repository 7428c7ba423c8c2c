//! AWS EventStream framing, used by Bedrock `ConverseStream` responses.
//!
//! Wire layout per message:
//!   [4B total length][4B headers length][4B CRC-32 of the prelude]
//!   [headers][payload][4B CRC-32 of everything before it]
//! Headers are a packed sequence of `{u8 name len, name, u8 type, value}`.

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const PRELUDE_LEN: usize = 12;
const CRC_LEN: usize = 4;
const MAX_MESSAGE_LEN: usize = 16_777_216;

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
	pub headers: Vec<Header>,
	pub payload: Bytes,
}

impl Message {
	/// The `:event-type` header names the shape of the payload.
	pub fn event_type(&self) -> Option<&str> {
		self.headers.iter().find_map(|h| {
			if h.key == ":event-type"
				&& let HeaderValue::String(s) = &h.value
			{
				Some(s.as_str())
			} else {
				None
			}
		})
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
	pub key: String,
	pub value: HeaderValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
	BoolTrue,
	BoolFalse,
	Byte(i8),
	Int16(i16),
	Int32(i32),
	Int64(i64),
	ByteArray(Bytes),
	String(String),
	Timestamp(i64),
	Uuid([u8; 16]),
}

#[derive(Debug, thiserror::Error)]
pub enum EventStreamError {
	#[error("message of {0} bytes exceeds the frame limit")]
	MessageTooLarge(usize),
	#[error("prelude CRC mismatch")]
	PreludeCrc,
	#[error("message CRC mismatch")]
	MessageCrc,
	#[error("malformed frame: {0}")]
	Malformed(&'static str),
	#[error(transparent)]
	Io(#[from] std::io::Error),
}

#[derive(Default)]
pub struct EventStreamDecoder;

impl Decoder for EventStreamDecoder {
	type Item = Message;
	type Error = EventStreamError;

	fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
		if src.len() < PRELUDE_LEN {
			return Ok(None);
		}
		let total_len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
		let headers_len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
		let prelude_crc = u32::from_be_bytes([src[8], src[9], src[10], src[11]]);
		if crc32fast::hash(&src[..8]) != prelude_crc {
			return Err(EventStreamError::PreludeCrc);
		}
		if total_len > MAX_MESSAGE_LEN {
			return Err(EventStreamError::MessageTooLarge(total_len));
		}
		if total_len < PRELUDE_LEN + CRC_LEN + headers_len {
			return Err(EventStreamError::Malformed("length fields inconsistent"));
		}
		if src.len() < total_len {
			return Ok(None);
		}
		let frame = src.split_to(total_len);
		let message_crc = u32::from_be_bytes([
			frame[total_len - 4],
			frame[total_len - 3],
			frame[total_len - 2],
			frame[total_len - 1],
		]);
		if crc32fast::hash(&frame[..total_len - CRC_LEN]) != message_crc {
			return Err(EventStreamError::MessageCrc);
		}
		let headers = parse_headers(&frame[PRELUDE_LEN..PRELUDE_LEN + headers_len])?;
		let payload = Bytes::copy_from_slice(&frame[PRELUDE_LEN + headers_len..total_len - CRC_LEN]);
		Ok(Some(Message { headers, payload }))
	}

	fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
		let res = self.decode(src)?;
		if res.is_none() {
			// A truncated trailing frame has nothing recoverable in it.
			src.clear();
		}
		Ok(res)
	}
}

fn parse_headers(mut buf: &[u8]) -> Result<Vec<Header>, EventStreamError> {
	let mut headers = Vec::new();
	while !buf.is_empty() {
		let name_len = buf[0] as usize;
		buf = &buf[1..];
		if buf.len() < name_len + 1 {
			return Err(EventStreamError::Malformed("truncated header name"));
		}
		let key = String::from_utf8_lossy(&buf[..name_len]).into_owned();
		buf = &buf[name_len..];
		let kind = buf[0];
		buf = &buf[1..];
		let value = match kind {
			0 => HeaderValue::BoolTrue,
			1 => HeaderValue::BoolFalse,
			2 => {
				let v = take(&mut buf, 1)?;
				HeaderValue::Byte(v[0] as i8)
			},
			3 => HeaderValue::Int16(i16::from_be_bytes(take(&mut buf, 2)?.try_into().unwrap())),
			4 => HeaderValue::Int32(i32::from_be_bytes(take(&mut buf, 4)?.try_into().unwrap())),
			5 => HeaderValue::Int64(i64::from_be_bytes(take(&mut buf, 8)?.try_into().unwrap())),
			6 => {
				let len = u16::from_be_bytes(take(&mut buf, 2)?.try_into().unwrap()) as usize;
				HeaderValue::ByteArray(Bytes::copy_from_slice(take(&mut buf, len)?))
			},
			7 => {
				let len = u16::from_be_bytes(take(&mut buf, 2)?.try_into().unwrap()) as usize;
				HeaderValue::String(String::from_utf8_lossy(take(&mut buf, len)?).into_owned())
			},
			8 => HeaderValue::Timestamp(i64::from_be_bytes(take(&mut buf, 8)?.try_into().unwrap())),
			9 => HeaderValue::Uuid(take(&mut buf, 16)?.try_into().unwrap()),
			_ => return Err(EventStreamError::Malformed("unknown header value type")),
		};
		headers.push(Header { key, value });
	}
	Ok(headers)
}

fn take<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8], EventStreamError> {
	if buf.len() < n {
		return Err(EventStreamError::Malformed("truncated header value"));
	}
	let (head, tail) = buf.split_at(n);
	*buf = tail;
	Ok(head)
}

/// Frame writer. The data plane itself only decodes EventStream, but the
/// encoder keeps the framing round-trippable for tests.
#[derive(Default)]
pub struct EventStreamEncoder;

impl Encoder<Message> for EventStreamEncoder {
	type Error = EventStreamError;

	fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
		let mut headers = BytesMut::new();
		for h in &item.headers {
			headers.put_u8(h.key.len() as u8);
			headers.put_slice(h.key.as_bytes());
			match &h.value {
				HeaderValue::BoolTrue => headers.put_u8(0),
				HeaderValue::BoolFalse => headers.put_u8(1),
				HeaderValue::Byte(v) => {
					headers.put_u8(2);
					headers.put_i8(*v);
				},
				HeaderValue::Int16(v) => {
					headers.put_u8(3);
					headers.put_i16(*v);
				},
				HeaderValue::Int32(v) => {
					headers.put_u8(4);
					headers.put_i32(*v);
				},
				HeaderValue::Int64(v) => {
					headers.put_u8(5);
					headers.put_i64(*v);
				},
				HeaderValue::ByteArray(v) => {
					headers.put_u8(6);
					headers.put_u16(v.len() as u16);
					headers.put_slice(v);
				},
				HeaderValue::String(v) => {
					headers.put_u8(7);
					headers.put_u16(v.len() as u16);
					headers.put_slice(v.as_bytes());
				},
				HeaderValue::Timestamp(v) => {
					headers.put_u8(8);
					headers.put_i64(*v);
				},
				HeaderValue::Uuid(v) => {
					headers.put_u8(9);
					headers.put_slice(v);
				},
			}
		}
		let total_len = PRELUDE_LEN + headers.len() + item.payload.len() + CRC_LEN;
		let mut prelude = [0u8; 8];
		prelude[..4].copy_from_slice(&(total_len as u32).to_be_bytes());
		prelude[4..].copy_from_slice(&(headers.len() as u32).to_be_bytes());

		let start = dst.len();
		dst.put_slice(&prelude);
		dst.put_u32(crc32fast::hash(&prelude));
		dst.put_slice(&headers);
		dst.put_slice(&item.payload);
		let crc = crc32fast::hash(&dst[start..]);
		dst.put_u32(crc);
		Ok(())
	}
}

/// Convenience constructor for an event message carrying a JSON payload.
pub fn event_message(event_type: &str, payload: impl Into<Bytes>) -> Message {
	Message {
		headers: vec![
			Header {
				key: ":message-type".to_string(),
				value: HeaderValue::String("event".to_string()),
			},
			Header {
				key: ":event-type".to_string(),
				value: HeaderValue::String(event_type.to_string()),
			},
		],
		payload: payload.into(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parse::Frames;

	fn encode(messages: &[Message]) -> BytesMut {
		let mut buf = BytesMut::new();
		for m in messages {
			EventStreamEncoder.encode(m.clone(), &mut buf).unwrap();
		}
		buf
	}

	#[test]
	fn round_trip() {
		let msg = event_message("contentBlockDelta", &br#"{"delta":{"text":"hi"}}"#[..]);
		let buf = encode(std::slice::from_ref(&msg));
		let mut frames = Frames::new(EventStreamDecoder);
		let got = frames.push(&buf, true).unwrap();
		assert_eq!(got, vec![msg.clone()]);
		assert_eq!(got[0].event_type(), Some("contentBlockDelta"));
	}

	#[test]
	fn split_at_every_offset_is_stable() {
		let buf = encode(&[
			event_message("messageStart", &br#"{"role":"assistant"}"#[..]),
			event_message("messageStop", &br#"{"stopReason":"end_turn"}"#[..]),
		]);
		let whole = Frames::new(EventStreamDecoder).push(&buf, true).unwrap();
		for split in 0..buf.len() {
			let mut frames = Frames::new(EventStreamDecoder);
			let mut got = frames.push(&buf[..split], false).unwrap();
			got.extend(frames.push(&buf[split..], true).unwrap());
			assert_eq!(got, whole, "split at {split}");
		}
	}

	#[test]
	fn corrupted_payload_fails_crc() {
		let mut buf = encode(&[event_message("metadata", &br#"{"usage":{}}"#[..])]);
		let mid = buf.len() / 2;
		buf[mid] ^= 0xff;
		let mut frames = Frames::new(EventStreamDecoder);
		assert!(frames.push(&buf, true).is_err());
	}

	#[test]
	fn all_header_value_types_round_trip() {
		let msg = Message {
			headers: vec![
				Header {
					key: "b".into(),
					value: HeaderValue::BoolTrue,
				},
				Header {
					key: "i32".into(),
					value: HeaderValue::Int32(-7),
				},
				Header {
					key: "bytes".into(),
					value: HeaderValue::ByteArray(Bytes::from_static(b"xyz")),
				},
				Header {
					key: "ts".into(),
					value: HeaderValue::Timestamp(1_700_000_000_000),
				},
				Header {
					key: "uuid".into(),
					value: HeaderValue::Uuid([7; 16]),
				},
			],
			payload: Bytes::from_static(b"{}"),
		};
		let buf = encode(std::slice::from_ref(&msg));
		let got = Frames::new(EventStreamDecoder).push(&buf, true).unwrap();
		assert_eq!(got, vec![msg]);
	}
}
