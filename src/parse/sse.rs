//! Server-Sent Events framing.
//!
//! Upstreams disagree about line endings: LF, CRLF, and bare CR all appear
//! in the wild. The first separator observed on a stream locks the framing;
//! the same separator must then delimit every following line. Event
//! boundaries are blank lines (a doubled separator).

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const DEFAULT_MAX_EVENT_SIZE: usize = 2_097_152;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
	pub name: Option<String>,
	pub id: Option<String>,
	pub data: Option<String>,
}

impl SseEvent {
	pub fn data(data: impl Into<String>) -> Self {
		SseEvent {
			name: None,
			id: None,
			data: Some(data.into()),
		}
	}

	pub fn is_done(&self) -> bool {
		self.data.as_deref() == Some("[DONE]")
	}
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Separator {
	Lf,
	CrLf,
	Cr,
}

impl Separator {
	fn as_bytes(&self) -> &'static [u8] {
		match self {
			Separator::Lf => b"\n",
			Separator::CrLf => b"\r\n",
			Separator::Cr => b"\r",
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum SseError {
	#[error("SSE event exceeds the {0} byte limit")]
	EventTooLarge(usize),
	#[error(transparent)]
	Io(#[from] std::io::Error),
}

pub struct SseDecoder {
	separator: Option<Separator>,
	max_size: usize,
}

impl SseDecoder {
	pub fn new() -> Self {
		Self::with_max_size(DEFAULT_MAX_EVENT_SIZE)
	}

	pub fn with_max_size(max_size: usize) -> Self {
		Self {
			separator: None,
			max_size,
		}
	}

	/// Inspect the buffer until the first line separator shows up and lock
	/// it. A trailing CR is ambiguous (it may be half of a CRLF) so we wait
	/// for one more byte unless the stream already ended.
	fn lock_separator(&mut self, src: &BytesMut, eof: bool) -> Option<Separator> {
		if let Some(s) = self.separator {
			return Some(s);
		}
		let pos = src.iter().position(|b| *b == b'\r' || *b == b'\n')?;
		let sep = match src[pos] {
			b'\n' => Separator::Lf,
			_ => match src.get(pos + 1) {
				Some(b'\n') => Separator::CrLf,
				Some(_) => Separator::Cr,
				None if eof => Separator::Cr,
				None => return None,
			},
		};
		self.separator = Some(sep);
		Some(sep)
	}

	fn decode_inner(&mut self, src: &mut BytesMut, eof: bool) -> Result<Option<SseEvent>, SseError> {
		loop {
			let Some(sep) = self.lock_separator(src, eof) else {
				return self.check_limits(src, eof);
			};
			let sep_bytes = sep.as_bytes();
			let boundary = [sep_bytes, sep_bytes].concat();
			let Some(end) = find(src, &boundary) else {
				// At end of stream an unterminated final event is still
				// dispatched.
				if eof && !src.is_empty() {
					let block = src.split_to(src.len()).freeze();
					if let Some(ev) = parse_event(&block, sep_bytes) {
						return Ok(Some(ev));
					}
					return Ok(None);
				}
				return self.check_limits(src, eof);
			};
			let block = src.split_to(end).freeze();
			src.advance(boundary.len());
			if let Some(ev) = parse_event(&block, sep_bytes) {
				return Ok(Some(ev));
			}
			// Comment-only or empty block; keep scanning.
		}
	}

	fn check_limits(&self, src: &BytesMut, eof: bool) -> Result<Option<SseEvent>, SseError> {
		if src.len() > self.max_size {
			return Err(SseError::EventTooLarge(self.max_size));
		}
		if eof && self.separator.is_none() && !src.is_empty() {
			// A stream that ends without ever producing a separator carries
			// no events.
			return Ok(None);
		}
		Ok(None)
	}
}

impl Default for SseDecoder {
	fn default() -> Self {
		Self::new()
	}
}

impl Decoder for SseDecoder {
	type Item = SseEvent;
	type Error = SseError;

	fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
		self.decode_inner(src, false)
	}

	fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
		let res = self.decode_inner(src, true)?;
		if res.is_none() {
			src.clear();
		}
		Ok(res)
	}
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	haystack
		.windows(needle.len())
		.position(|window| window == needle)
}

fn parse_event(block: &Bytes, sep: &[u8]) -> Option<SseEvent> {
	let mut ev = SseEvent::default();
	let mut data: Option<String> = None;
	for line in split_lines(block, sep) {
		let Some((field, value)) = split_field(line) else {
			continue;
		};
		match field {
			b"data" => {
				let value = String::from_utf8_lossy(value);
				match &mut data {
					Some(d) => {
						d.push('\n');
						d.push_str(&value);
					},
					None => data = Some(value.into_owned()),
				}
			},
			b"event" => ev.name = Some(String::from_utf8_lossy(value).into_owned()),
			b"id" => ev.id = Some(String::from_utf8_lossy(value).into_owned()),
			// Comments (leading ':') and unknown fields are ignored.
			_ => {},
		}
	}
	ev.data = data;
	if ev.name.is_none() && ev.id.is_none() && ev.data.is_none() {
		return None;
	}
	Some(ev)
}

fn split_lines<'a>(block: &'a [u8], sep: &'a [u8]) -> impl Iterator<Item = &'a [u8]> {
	let mut rest = block;
	std::iter::from_fn(move || {
		if rest.is_empty() {
			return None;
		}
		match find(rest, sep) {
			Some(i) => {
				let line = &rest[..i];
				rest = &rest[i + sep.len()..];
				Some(line)
			},
			None => {
				let line = rest;
				rest = &[];
				Some(line)
			},
		}
	})
}

fn split_field(line: &[u8]) -> Option<(&[u8], &[u8])> {
	if line.is_empty() {
		return None;
	}
	match line.iter().position(|b| *b == b':') {
		// A line starting with ':' is a comment.
		Some(0) => None,
		Some(i) => {
			let mut value = &line[i + 1..];
			if value.first() == Some(&b' ') {
				value = &value[1..];
			}
			Some((&line[..i], value))
		},
		None => Some((line, &[][..])),
	}
}

/// Encodes events with LF line endings regardless of what the upstream
/// used, so clients always observe normalized framing.
pub struct SseEncoder;

impl Encoder<SseEvent> for SseEncoder {
	type Error = SseError;

	fn encode(&mut self, item: SseEvent, dst: &mut BytesMut) -> Result<(), Self::Error> {
		if let Some(name) = &item.name
			&& !name.is_empty()
		{
			dst.extend_from_slice(b"event: ");
			dst.extend_from_slice(name.as_bytes());
			dst.extend_from_slice(b"\n");
		}
		if let Some(id) = &item.id {
			dst.extend_from_slice(b"id: ");
			dst.extend_from_slice(id.as_bytes());
			dst.extend_from_slice(b"\n");
		}
		if let Some(data) = &item.data {
			for line in data.split('\n') {
				dst.extend_from_slice(b"data: ");
				dst.extend_from_slice(line.as_bytes());
				dst.extend_from_slice(b"\n");
			}
		}
		dst.extend_from_slice(b"\n");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parse::Frames;

	fn decode_all(input: &[u8]) -> Vec<SseEvent> {
		let mut frames = Frames::new(SseDecoder::new());
		frames.push(input, true).unwrap()
	}

	#[test]
	fn parses_each_line_ending_style() {
		for sep in ["\n", "\r\n", "\r"] {
			let input = format!("event: chunk{sep}id: 7{sep}data: hello{sep}{sep}");
			let events = decode_all(input.as_bytes());
			assert_eq!(events.len(), 1, "separator {sep:?}");
			assert_eq!(events[0].name.as_deref(), Some("chunk"));
			assert_eq!(events[0].id.as_deref(), Some("7"));
			assert_eq!(events[0].data.as_deref(), Some("hello"));
		}
	}

	#[test]
	fn first_separator_locks() {
		// Stream locks to LF; a CRLF later is not an LF-separated blank
		// line, so the '\r' stays inside the line content.
		let events = decode_all(b"data: a\n\ndata: b\r\ndata: c\n\n");
		assert_eq!(events.len(), 2);
		assert_eq!(events[0].data.as_deref(), Some("a"));
		assert_eq!(events[1].data.as_deref(), Some("b\r\nc"));
	}

	#[test]
	fn multiline_data_joined_with_lf() {
		let events = decode_all(b"data: one\ndata: two\n\n");
		assert_eq!(events[0].data.as_deref(), Some("one\ntwo"));
	}

	#[test]
	fn comments_are_skipped() {
		let events = decode_all(b": keepalive\n\ndata: x\n\n");
		assert_eq!(events.len(), 1);
		assert_eq!(events[0].data.as_deref(), Some("x"));
	}

	#[test]
	fn unterminated_final_event_flushes_at_eof() {
		let events = decode_all(b"data: a\n\ndata: tail\n");
		assert_eq!(events.len(), 2);
		assert_eq!(events[1].data.as_deref(), Some("tail"));
	}

	#[test]
	fn trailing_cr_waits_for_disambiguation() {
		let mut frames = Frames::new(SseDecoder::new());
		// "\r" could be CR or the start of CRLF: nothing may be emitted yet.
		assert!(frames.push(b"data: a\r", false).unwrap().is_empty());
		let events = frames.push(b"\rdata: b\r\r", true).unwrap();
		assert_eq!(events.len(), 2);
		assert_eq!(events[0].data.as_deref(), Some("a"));
		assert_eq!(events[1].data.as_deref(), Some("b"));
	}

	#[test]
	fn encode_then_decode_round_trips() {
		let ev = SseEvent {
			name: Some("message".into()),
			id: Some("42".into()),
			data: Some("line1\nline2".into()),
		};
		let mut buf = BytesMut::new();
		SseEncoder.encode(ev.clone(), &mut buf).unwrap();
		let events = decode_all(&buf);
		assert_eq!(events, vec![ev]);
	}

	#[test]
	fn done_marker() {
		let events = decode_all(b"data: [DONE]\n\n");
		assert!(events[0].is_done());
	}

	#[test]
	fn oversized_event_is_rejected() {
		let mut frames = Frames::new(SseDecoder::with_max_size(16));
		let big = vec![b'a'; 64];
		assert!(frames.push(&big, false).is_err());
	}
}
