//! Module containing the in-memory representation of data frames.
use crate::result::WebSocketResult;
use crate::util::bytes_to_string;
use crate::util::mask;
use std::fmt;
use std::str::from_utf8;

/// Largest payload a control frame may carry (RFC6455 5.5).
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Represents a WebSocket data frame.
///
/// The payload held in a Frame is never masked. Masking and unmasking happen
/// while generating and parsing; `mask` only records the key that was (or
/// will be) used on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
	/// Whether or not this constitutes the end of a message
	pub fin: bool,
	/// The reserved portion of the data frame (RFC6455 5.2), `[rsv1, rsv2, rsv3]`
	pub reserved: [bool; 3],
	/// The opcode associated with this data frame
	pub opcode: Opcode,
	/// The masking key, if the frame is masked
	pub mask: Option<[u8; 4]>,
	/// The unmasked payload
	pub payload: Vec<u8>,
}

impl Frame {
	/// Creates a new final, unmasked frame.
	pub fn new(opcode: Opcode, payload: Vec<u8>) -> Frame {
		Frame {
			fin: true,
			reserved: [false; 3],
			opcode,
			mask: None,
			payload,
		}
	}

	/// A text frame.
	pub fn text<S: Into<String>>(text: S) -> Frame {
		Frame::new(Opcode::Text, text.into().into_bytes())
	}

	/// A binary frame.
	pub fn binary<B: Into<Vec<u8>>>(data: B) -> Frame {
		Frame::new(Opcode::Binary, data.into())
	}

	/// A continuation frame, carrying a later fragment of a message.
	pub fn continuation<B: Into<Vec<u8>>>(data: B) -> Frame {
		Frame::new(Opcode::Continuation, data.into())
	}

	/// A ping frame.
	pub fn ping<B: Into<Vec<u8>>>(data: B) -> Frame {
		Frame::new(Opcode::Ping, data.into())
	}

	/// A pong frame.
	pub fn pong<B: Into<Vec<u8>>>(data: B) -> Frame {
		Frame::new(Opcode::Pong, data.into())
	}

	/// A close frame with a status code and a reason.
	pub fn close(code: u16, reason: &str) -> Frame {
		let mut payload = Vec::with_capacity(2 + reason.len());
		payload.extend_from_slice(&code.to_be_bytes());
		payload.extend_from_slice(reason.as_bytes());
		Frame::new(Opcode::Close, payload)
	}

	/// Sets the FIN bit.
	pub fn with_fin(mut self, fin: bool) -> Frame {
		self.fin = fin;
		self
	}

	/// Sets the reserved bits.
	pub fn with_reserved(mut self, reserved: [bool; 3]) -> Frame {
		self.reserved = reserved;
		self
	}

	/// Masks the frame on the wire with `key`.
	pub fn with_mask(mut self, key: [u8; 4]) -> Frame {
		self.mask = Some(key);
		self
	}

	/// Masks the frame on the wire with a freshly generated key.
	pub fn with_random_mask(self) -> Frame {
		self.with_mask(mask::gen_mask())
	}

	/// Whether the frame is masked on the wire.
	pub fn is_masked(&self) -> bool {
		self.mask.is_some()
	}

	/// Whether this is a control frame.
	pub fn is_control(&self) -> bool {
		self.opcode.is_control()
	}

	/// Whether this is a data frame.
	pub fn is_data(&self) -> bool {
		!self.opcode.is_control()
	}

	/// Payload length in bytes.
	pub fn payload_len(&self) -> usize {
		self.payload.len()
	}

	/// Borrows the payload as UTF-8 text.
	pub fn payload_as_utf8(&self) -> WebSocketResult<&str> {
		Ok(from_utf8(&self.payload)?)
	}

	/// Copies the payload into an owned String.
	pub fn payload_to_string(&self) -> WebSocketResult<String> {
		Ok(bytes_to_string(&self.payload)?)
	}

	/// Status code and reason of a close frame.
	///
	/// Returns `None` for other opcodes and for close frames without a code.
	pub fn close_code_and_reason(&self) -> Option<(u16, String)> {
		if self.opcode != Opcode::Close || self.payload.len() < 2 {
			return None;
		}
		let code = u16::from_be_bytes([self.payload[0], self.payload[1]]);
		let reason = String::from_utf8_lossy(&self.payload[2..]).into_owned();
		Some((code, reason))
	}
}

/// Represents a WebSocket data frame opcode
#[derive(Clone, Debug, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
	/// A continuation data frame
	Continuation,
	/// A UTF-8 text data frame
	Text,
	/// A binary data frame
	Binary,
	/// An undefined non-control data frame (3-7)
	NonControl(u8),
	/// A close data frame
	Close,
	/// A ping data frame
	Ping,
	/// A pong data frame
	Pong,
	/// An undefined control data frame (11-15)
	Control(u8),
}

impl Opcode {
	/// Attempts to form an Opcode from a nibble.
	///
	/// Returns the Opcode, or None if the opcode is out of range.
	pub fn new(op: u8) -> Option<Opcode> {
		Some(match op {
			0 => Opcode::Continuation,
			1 => Opcode::Text,
			2 => Opcode::Binary,
			3..=7 => Opcode::NonControl(op),
			8 => Opcode::Close,
			9 => Opcode::Ping,
			10 => Opcode::Pong,
			11..=15 => Opcode::Control(op),
			_ => return None,
		})
	}

	/// The 4-bit wire value.
	pub fn as_u8(self) -> u8 {
		match self {
			Opcode::Continuation => 0,
			Opcode::Text => 1,
			Opcode::Binary => 2,
			Opcode::NonControl(op) => op & 0x0F,
			Opcode::Close => 8,
			Opcode::Ping => 9,
			Opcode::Pong => 10,
			Opcode::Control(op) => op & 0x0F,
		}
	}

	/// Control opcodes have the high bit of the nibble set.
	pub fn is_control(self) -> bool {
		self.as_u8() & 0x08 != 0
	}

	/// Whether RFC6455 leaves this opcode undefined.
	pub fn is_reserved(self) -> bool {
		match self {
			Opcode::NonControl(_) | Opcode::Control(_) => true,
			_ => false,
		}
	}
}

impl fmt::Display for Opcode {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Opcode::Continuation => f.write_str("CONTINUATION"),
			Opcode::Text => f.write_str("TEXT"),
			Opcode::Binary => f.write_str("BINARY"),
			Opcode::Close => f.write_str("CLOSE"),
			Opcode::Ping => f.write_str("PING"),
			Opcode::Pong => f.write_str("PONG"),
			Opcode::NonControl(op) | Opcode::Control(op) => write!(f, "RESERVED({})", op),
		}
	}
}
