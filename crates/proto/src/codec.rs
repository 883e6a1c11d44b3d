//! Newline-delimited JSON framing.
//!
//! Each frame is a single JSON document followed by `\n`. Blank lines are
//! ignored so that hand-driven sessions (e.g. `socat`) stay usable.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtoError;

/// Upper bound on a single encoded frame.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Reads the next frame from `input`.
///
/// Returns `Ok(None)` on a clean end of stream. At most
/// `MAX_FRAME_BYTES + 1` bytes are buffered per line, so a peer that never
/// sends a newline cannot grow the reader's memory past the cap.
///
/// # Errors
///
/// Returns [`ProtoError::Io`] on transport failure, [`ProtoError::FrameTooLarge`]
/// for oversized frames and [`ProtoError::Decode`] for malformed JSON.
pub async fn read_frame<T>(input: &mut (impl AsyncBufRead + Unpin)) -> Result<Option<T>, ProtoError>
where
	T: DeserializeOwned,
{
	let mut line = Vec::new();
	loop {
		line.clear();
		let read = (&mut *input)
			.take(MAX_FRAME_BYTES as u64 + 1)
			.read_until(b'\n', &mut line)
			.await?;
		if read == 0 {
			return Ok(None);
		}
		let body = line.strip_suffix(b"\n").map_or(line.len(), <[u8]>::len);
		if body > MAX_FRAME_BYTES {
			return Err(ProtoError::FrameTooLarge { len: body });
		}
		if line.iter().all(u8::is_ascii_whitespace) {
			continue;
		}
		return serde_json::from_slice(&line).map(Some).map_err(ProtoError::Decode);
	}
}

/// Writes one frame to `output` and flushes it.
///
/// # Errors
///
/// Returns [`ProtoError::Encode`] if the frame cannot be serialized and
/// [`ProtoError::Io`] on transport failure.
pub async fn write_frame<T>(output: &mut (impl AsyncWrite + Unpin), frame: &T) -> Result<(), ProtoError>
where
	T: Serialize,
{
	let mut buf = serde_json::to_vec(frame).map_err(ProtoError::Encode)?;
	if buf.len() > MAX_FRAME_BYTES {
		return Err(ProtoError::FrameTooLarge { len: buf.len() });
	}
	buf.push(b'\n');
	output.write_all(&buf).await?;
	output.flush().await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::io;
	use std::pin::Pin;
	use std::task::{Context, Poll};

	use tokio::io::{AsyncRead, AsyncWriteExt, BufReader, ReadBuf};

	use super::*;
	use crate::types::{ClientFrame, ClientId, ServerFrame};

	/// Stream of `a` bytes that never ends and never sends a newline.
	#[derive(Default)]
	struct Endless {
		produced: usize,
	}

	impl AsyncRead for Endless {
		fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
			let n = buf.remaining();
			buf.initialize_unfilled().fill(b'a');
			buf.advance(n);
			self.get_mut().produced += n;
			Poll::Ready(Ok(()))
		}
	}

	#[tokio::test(flavor = "current_thread")]
	async fn newline_free_stream_stops_at_frame_cap() {
		let mut reader = BufReader::with_capacity(4096, Endless::default());
		let err = read_frame::<ClientFrame>(&mut reader).await.unwrap_err();
		assert!(matches!(err, ProtoError::FrameTooLarge { len } if len == MAX_FRAME_BYTES + 1));

		let consumed = reader.get_ref().produced;
		assert!(
			consumed <= MAX_FRAME_BYTES + 1 + 4096,
			"read {consumed} bytes for a {MAX_FRAME_BYTES} byte cap"
		);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn final_line_without_newline_is_a_frame() {
		let (mut tx, rx) = tokio::io::duplex(1024);
		tx.write_all(b"{\"type\":\"bye\"}").await.unwrap();
		drop(tx);

		let mut reader = BufReader::new(rx);
		let frame: Option<ClientFrame> = read_frame(&mut reader).await.unwrap();
		assert_eq!(frame, Some(ClientFrame::Bye));
	}

	#[tokio::test(flavor = "current_thread")]
	async fn reads_frames_skipping_blank_lines_until_eof() {
		let (mut tx, rx) = tokio::io::duplex(1024);
		tx.write_all(b"{\"type\":\"hello\"}\n\n  \n{\"type\":\"bye\"}\n").await.unwrap();
		drop(tx);

		let mut reader = BufReader::new(rx);
		let first: Option<ClientFrame> = read_frame(&mut reader).await.unwrap();
		assert_eq!(first, Some(ClientFrame::Hello { label: None }));
		let second: Option<ClientFrame> = read_frame(&mut reader).await.unwrap();
		assert_eq!(second, Some(ClientFrame::Bye));
		let end: Option<ClientFrame> = read_frame(&mut reader).await.unwrap();
		assert!(end.is_none());
	}

	#[tokio::test(flavor = "current_thread")]
	async fn malformed_frame_is_decode_error() {
		let (mut tx, rx) = tokio::io::duplex(1024);
		tx.write_all(b"{not json}\n").await.unwrap();
		drop(tx);

		let mut reader = BufReader::new(rx);
		let err = read_frame::<ClientFrame>(&mut reader).await.unwrap_err();
		assert!(matches!(err, ProtoError::Decode(_)));
		assert!(!err.is_disconnect());
	}

	#[tokio::test(flavor = "current_thread")]
	async fn written_frame_is_readable_by_peer() {
		let (mut tx, rx) = tokio::io::duplex(1024);
		write_frame(&mut tx, &ServerFrame::Welcome { client_id: ClientId(3) }).await.unwrap();
		drop(tx);

		let mut reader = BufReader::new(rx);
		let frame: Option<ServerFrame> = read_frame(&mut reader).await.unwrap();
		assert_eq!(frame, Some(ServerFrame::Welcome { client_id: ClientId(3) }));
	}
}
