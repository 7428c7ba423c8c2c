use bytes::BytesMut;
use tokio_util::codec::Decoder;

pub mod aws_sse;
pub mod sse;

/// Frames drives a codec over the body chunks the proxy streams to us.
/// Each chunk is appended to an internal buffer and decoded as far as
/// possible; a chunk split at any byte offset never changes the decoded
/// items.
pub struct Frames<D> {
	decoder: D,
	buffer: BytesMut,
	finished: bool,
}

impl<D: Decoder> Frames<D> {
	pub fn new(decoder: D) -> Self {
		Self {
			decoder,
			buffer: BytesMut::new(),
			finished: false,
		}
	}

	pub fn push(&mut self, chunk: &[u8], end_of_stream: bool) -> Result<Vec<D::Item>, D::Error> {
		self.buffer.extend_from_slice(chunk);
		if end_of_stream {
			self.finished = true;
		}
		let mut items = Vec::new();
		loop {
			let decoded = if self.finished {
				self.decoder.decode_eof(&mut self.buffer)?
			} else {
				self.decoder.decode(&mut self.buffer)?
			};
			match decoded {
				Some(item) => items.push(item),
				None => return Ok(items),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::sse::{SseDecoder, SseEvent};
	use super::*;

	#[test]
	fn split_at_every_offset_is_stable() {
		let stream = b"event: a\ndata: one\n\ndata: two\ndata: three\n\n";
		let whole = {
			let mut f = Frames::new(SseDecoder::new());
			f.push(stream, true).unwrap()
		};
		for split in 0..stream.len() {
			let mut f = Frames::new(SseDecoder::new());
			let mut got: Vec<SseEvent> = f.push(&stream[..split], false).unwrap();
			got.extend(f.push(&stream[split..], true).unwrap());
			assert_eq!(got, whole, "split at {split}");
		}
	}
}
