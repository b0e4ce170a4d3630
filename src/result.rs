//! The result type used within websocket-framing

use std::error::Error;
use std::fmt;
use std::str::Utf8Error;

/// The type used for WebSocket framing results
pub type WebSocketResult<T> = Result<T, WebSocketError>;

/// Represents a WebSocket framing error
#[derive(Debug, Clone, PartialEq)]
pub enum WebSocketError {
	/// The destination buffer cannot hold the bytes about to be generated.
	///
	/// Nothing has been written when this is returned.
	BufferOverflow {
		/// Bytes the write required
		needed: usize,
		/// Bytes the buffer had room for
		remaining: usize,
	},
	/// A WebSocket protocol error
	ProtocolError(&'static str),
	/// A frame declared a payload longer than the configured maximum
	FrameTooLarge {
		/// Declared payload length
		length: u64,
		/// Configured maximum
		max: u64,
	},
	/// The input ended before a complete frame was available
	IncompleteInput,
	/// A UTF-8 error
	Utf8Error(Utf8Error),
	/// The frame queue has been closed
	QueueClosed,
}

impl WebSocketError {
	/// Whether this error means the incoming byte stream can no longer be trusted.
	pub fn is_protocol_error(&self) -> bool {
		match self {
			WebSocketError::ProtocolError(_) | WebSocketError::FrameTooLarge { .. } => true,
			_ => false,
		}
	}
}

impl fmt::Display for WebSocketError {
	fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
		fmt.write_str("WebSocketError: ")?;
		match self {
			WebSocketError::BufferOverflow { needed, remaining } => write!(
				fmt,
				"buffer overflow ({} bytes needed, {} remaining)",
				needed, remaining
			),
			WebSocketError::ProtocolError(reason) => {
				write!(fmt, "WebSocket protocol error: {}", reason)
			}
			WebSocketError::FrameTooLarge { length, max } => write!(
				fmt,
				"frame payload of {} bytes exceeds maximum of {}",
				length, max
			),
			WebSocketError::IncompleteInput => fmt.write_str("Incomplete frame input"),
			WebSocketError::Utf8Error(_) => fmt.write_str("UTF-8 failure"),
			WebSocketError::QueueClosed => fmt.write_str("Frame queue closed"),
		}
	}
}

impl Error for WebSocketError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match *self {
			WebSocketError::Utf8Error(ref error) => Some(error),
			_ => None,
		}
	}
}

impl From<Utf8Error> for WebSocketError {
	fn from(err: Utf8Error) -> WebSocketError {
		WebSocketError::Utf8Error(err)
	}
}
