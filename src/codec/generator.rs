//! Serialization of frames into caller-supplied buffers.

use bytes::BufMut;
use tracing::trace;

use crate::dataframe::{Frame, Opcode, MAX_CONTROL_PAYLOAD};
use crate::result::{WebSocketError, WebSocketResult};
use crate::util::header::{self as dfh, DataFrameFlags};
use crate::util::mask;

/// Masked payload is staged through a stack buffer of this size.
const MASK_CHUNK: usize = 512;

/// Writes frames in RFC6455 wire format.
///
/// The generator keeps no state between calls, so one instance can be shared
/// freely between threads as long as each call targets its own buffer.
/// Buffers never grow: a write that does not fit fails with
/// `WebSocketError::BufferOverflow` and leaves the buffer untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Generator;

impl Generator {
	/// Creates a generator.
	pub fn new() -> Generator {
		Generator
	}

	/// Number of header bytes `generate_header` writes for `frame`.
	pub fn header_length(&self, frame: &Frame) -> usize {
		dfh::header_length(frame.payload.len() as u64, frame.is_masked())
	}

	/// Number of bytes `generate_whole_frame` writes for `frame`.
	pub fn frame_length(&self, frame: &Frame) -> usize {
		self.header_length(frame) + frame.payload.len()
	}

	/// Writes the header of `frame`: flags and opcode, mask bit and length,
	/// any extended length bytes and the masking key.
	pub fn generate_header<B: BufMut>(&self, frame: &Frame, buf: &mut B) -> WebSocketResult<()> {
		check_outgoing(frame)?;

		let mut header = [0u8; 14];
		let used = dfh::encode_header(
			DataFrameFlags::from_parts(frame.fin, frame.reserved),
			frame.opcode.as_u8(),
			frame.mask,
			frame.payload.len() as u64,
			&mut header,
		);
		ensure_room(buf, used)?;
		buf.put_slice(&header[..used]);

		trace!(
			fin = frame.fin,
			opcode = %frame.opcode,
			masked = frame.is_masked(),
			payload_len = frame.payload.len(),
			header_len = used,
			"Generated WebSocket frame header"
		);
		Ok(())
	}

	/// Writes the payload of `frame`, masked if the frame carries a key.
	pub fn generate_payload<B: BufMut>(&self, frame: &Frame, buf: &mut B) -> WebSocketResult<()> {
		ensure_room(buf, frame.payload.len())?;

		match frame.mask {
			Some(key) => {
				let mut scratch = [0u8; MASK_CHUNK];
				let mut offset = 0;
				for chunk in frame.payload.chunks(MASK_CHUNK) {
					let staged = &mut scratch[..chunk.len()];
					staged.copy_from_slice(chunk);
					mask::apply_mask(staged, key, offset);
					buf.put_slice(staged);
					offset += chunk.len();
				}
			}
			None => buf.put_slice(&frame.payload),
		}
		Ok(())
	}

	/// Writes header and payload, checking up front that the whole frame fits.
	pub fn generate_whole_frame<B: BufMut>(
		&self,
		frame: &Frame,
		buf: &mut B,
	) -> WebSocketResult<()> {
		check_outgoing(frame)?;
		ensure_room(buf, self.frame_length(frame))?;
		self.generate_header(frame, buf)?;
		self.generate_payload(frame, buf)
	}
}

fn ensure_room<B: BufMut>(buf: &B, needed: usize) -> WebSocketResult<()> {
	let remaining = buf.remaining_mut();
	if remaining < needed {
		return Err(WebSocketError::BufferOverflow { needed, remaining });
	}
	Ok(())
}

fn check_outgoing(frame: &Frame) -> WebSocketResult<()> {
	match frame.opcode {
		Opcode::NonControl(3..=7) | Opcode::Control(11..=15) => (),
		Opcode::NonControl(_) | Opcode::Control(_) => {
			return Err(WebSocketError::ProtocolError("Reserved opcode out of range"));
		}
		_ => (),
	}
	if frame.is_control() {
		if !frame.fin {
			return Err(WebSocketError::ProtocolError(
				"Illegal fragmented control frame",
			));
		}
		if frame.payload.len() > MAX_CONTROL_PAYLOAD {
			return Err(WebSocketError::ProtocolError(
				"Control frame length too long",
			));
		}
	}
	Ok(())
}
