//! Framing and codec errors.

/// Errors raised while reading or writing protocol frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
	/// Underlying transport failure.
	#[error("transport i/o failed: {0}")]
	Io(#[from] std::io::Error),
	/// A frame could not be decoded.
	#[error("malformed frame: {0}")]
	Decode(#[source] serde_json::Error),
	/// A frame could not be encoded.
	#[error("frame encoding failed: {0}")]
	Encode(#[source] serde_json::Error),
	/// A frame exceeded [`crate::codec::MAX_FRAME_BYTES`].
	#[error("frame of {len} bytes exceeds limit")]
	FrameTooLarge {
		/// Observed frame length in bytes.
		len: usize,
	},
}

impl ProtoError {
	/// Returns true if the error means the peer went away rather than misbehaved.
	#[must_use]
	pub fn is_disconnect(&self) -> bool {
		match self {
			Self::Io(err) => matches!(
				err.kind(),
				std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::UnexpectedEof
			),
			_ => false,
		}
	}
}
