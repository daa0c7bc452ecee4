//! Decoder for streamed caption and query responses.
//!
//! The service answers a streaming request with newline-delimited frames:
//!
//! ```text
//! data: {"chunk":"A red"}
//! data: {"chunk":" car"}
//! data: {"completed":true}
//! ```
//!
//! [`FragmentStream`] reassembles those lines across network chunk
//! boundaries and yields each `chunk` in arrival order. The sequence ends at
//! the first `completed: true` frame, at the end of the body, or at the first
//! malformed frame (as an error). The body is dropped as soon as the sequence
//! ends, so the connection is released even if the caller stops early.
//!
//! Lines end at `\n`, optionally preceded by `\r`. A bare `\r` is not a line
//! terminator, so a body framed only with `\r` reads as one long line.

use std::fmt;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::BytesMut;
use futures_util::stream::{FusedStream, Stream};
use futures_util::StreamExt;
use serde::Deserialize;

use crate::common::{MoondreamError, Result};
use crate::transport::ByteStream;

/// Prefix of every protocol line.
pub const DATA_PREFIX: &[u8] = b"data: ";

/// One decoded `data: {...}` line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Frame {
	#[serde(default)]
	pub chunk: Option<String>,
	#[serde(default)]
	pub completed: Option<bool>,
}

impl Frame {
	/// Parse one line without its terminator.
	///
	/// Returns `None` for lines that are not `data: ` frames (comments, event
	/// names, blank keep-alives).
	pub fn parse_line(line: &[u8]) -> Option<std::result::Result<Frame, serde_json::Error>> {
		let line = line.strip_suffix(b"\r").unwrap_or(line);
		let payload = line.strip_prefix(DATA_PREFIX)?;
		Some(serde_json::from_slice(payload))
	}

	pub fn is_completed(&self) -> bool {
		self.completed == Some(true)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
	Streaming,
	Completed,
	Failed,
}

/// Lazily decoded text fragments of one streaming response.
///
/// Polling drives the network reads. The stream is single-consumer: it is
/// neither `Clone` nor shareable behind `&`, so two readers cannot interleave.
pub struct FragmentStream {
	source: Option<ByteStream>,
	buffer: BytesMut,
	/// Prefix of `buffer` already searched for `\n`.
	scanned: usize,
	state: State,
	emitted: usize,
}

/// Wrap a raw response body.
pub fn decode(source: ByteStream) -> FragmentStream {
	FragmentStream::new(source)
}

impl FragmentStream {
	pub fn new(source: ByteStream) -> Self {
		Self { source: Some(source), buffer: BytesMut::new(), scanned: 0, state: State::Streaming, emitted: 0 }
	}

	/// Concatenate every remaining fragment.
	pub async fn collect_text(mut self) -> Result<String> {
		let mut text = String::new();
		while let Some(fragment) = self.next().await {
			text.push_str(&fragment?);
		}
		Ok(text)
	}

	/// Number of fragments yielded so far.
	pub fn emitted(&self) -> usize {
		self.emitted
	}

	fn next_line(&mut self) -> Option<BytesMut> {
		let Some(offset) = self.buffer[self.scanned..].iter().position(|byte| *byte == b'\n') else {
			self.scanned = self.buffer.len();
			return None;
		};
		let mut line = self.buffer.split_to(self.scanned + offset + 1);
		self.scanned = 0;
		line.truncate(line.len() - 1);
		Some(line)
	}

	/// Apply one complete line. `Some` means the caller has something to yield.
	fn process_line(&mut self, line: &[u8]) -> Option<Result<String>> {
		match Frame::parse_line(line)? {
			Ok(frame) => {
				if frame.chunk.is_some() {
					self.emitted += 1;
				}
				if frame.is_completed() {
					self.finish();
				}
				frame.chunk.map(Ok)
			}
			Err(source) => {
				let line = String::from_utf8_lossy(line).into_owned();
				tracing::warn!(%line, error = %source, "malformed stream frame");
				self.close(State::Failed);
				Some(Err(MoondreamError::MalformedFrame { line, source }))
			}
		}
	}

	fn finish(&mut self) {
		tracing::debug!(fragments = self.emitted, "stream completed");
		self.close(State::Completed);
	}

	fn close(&mut self, state: State) {
		self.state = state;
		self.source = None;
		self.buffer.clear();
		self.scanned = 0;
	}
}

impl Stream for FragmentStream {
	type Item = Result<String>;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		let this = self.get_mut();
		loop {
			if this.state != State::Streaming {
				return Poll::Ready(None);
			}

			if let Some(line) = this.next_line() {
				match this.process_line(&line) {
					Some(item) => return Poll::Ready(Some(item)),
					None => continue,
				}
			}

			let Some(source) = this.source.as_mut() else {
				this.finish();
				return Poll::Ready(None);
			};

			match ready!(source.as_mut().poll_next(cx)) {
				Some(Ok(chunk)) => this.buffer.extend_from_slice(&chunk),
				Some(Err(err)) => {
					tracing::warn!(error = %err, "stream aborted");
					this.close(State::Failed);
					return Poll::Ready(Some(Err(err)));
				}
				None => {
					// end of body is an implicit completion; flush the last line
					this.source = None;
					let rest = std::mem::take(&mut this.buffer);
					this.scanned = 0;
					let item = this.process_line(&rest);
					if this.state == State::Streaming {
						this.finish();
					}
					return Poll::Ready(item);
				}
			}
		}
	}
}

impl FusedStream for FragmentStream {
	fn is_terminated(&self) -> bool {
		self.state != State::Streaming
	}
}

impl fmt::Debug for FragmentStream {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FragmentStream")
			.field("state", &self.state)
			.field("buffered", &self.buffer.len())
			.field("emitted", &self.emitted)
			.finish()
	}
}
