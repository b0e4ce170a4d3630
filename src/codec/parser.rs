//! Resumable parsing of frames from arbitrarily chunked input.

use std::cmp;
use std::mem;

use byteorder::{BigEndian, ByteOrder};
use bytes::Buf;
use tracing::{debug, trace};

use super::{Behavior, ParserConfig, ReservedBits, UnknownOpcodes};
use crate::dataframe::{Frame, Opcode, MAX_CONTROL_PAYLOAD};
use crate::result::{WebSocketError, WebSocketResult};
use crate::util::header::{DataFrameFlags, LengthEncoding, MASK_BIT, MASK_KEY_LENGTH};
use crate::util::mask;

/// Upper bound on the payload space reserved before the bytes actually arrive.
const INITIAL_PAYLOAD_RESERVE: u64 = 64 * 1024;

/// Receives the frames a `Parser` decodes.
pub trait FrameHandler {
	/// Called once per decoded frame, in wire order.
	fn on_frame(&mut self, frame: Frame) -> WebSocketResult<()>;
}

impl FrameHandler for Vec<Frame> {
	fn on_frame(&mut self, frame: Frame) -> WebSocketResult<()> {
		self.push(frame);
		Ok(())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
	/// Waiting for the two fixed header bytes
	Start,
	/// Waiting for the 2 or 8 extended length bytes
	PayloadLength,
	/// Waiting for the 4 byte masking key
	MaskKey,
	/// Collecting payload bytes
	Payload,
	/// A protocol error was seen, nothing more is read
	Failed,
}

/// An incremental WebSocket frame parser.
///
/// Feed it bytes as they arrive with `parse` or `next_frame`; it consumes
/// everything it is given, keeps whatever part of a frame is still missing,
/// and picks up from there on the next call. Header bytes are accumulated in a
/// fixed scratch area and payload bytes are unmasked as they are copied, so a
/// frame may be split anywhere, including inside the header or masking key.
///
/// A parser belongs to one byte stream. Once it reports a protocol error it
/// refuses all further input until `reset`.
#[derive(Debug)]
pub struct Parser {
	config: ParserConfig,
	state: State,
	scratch: [u8; 8],
	filled: usize,
	flags: DataFrameFlags,
	opcode: Opcode,
	encoding: LengthEncoding,
	masked: bool,
	mask: Option<[u8; 4]>,
	mask_offset: usize,
	remaining: u64,
	fragments: usize,
	payload: Vec<u8>,
}

impl Parser {
	/// Creates a parser waiting for the start of a frame.
	pub fn new(config: ParserConfig) -> Parser {
		Parser {
			config,
			state: State::Start,
			scratch: [0; 8],
			filled: 0,
			flags: DataFrameFlags::empty(),
			opcode: Opcode::Continuation,
			encoding: LengthEncoding::Direct,
			masked: false,
			mask: None,
			mask_offset: 0,
			remaining: 0,
			fragments: 0,
			payload: Vec::new(),
		}
	}

	/// The configuration this parser was built with.
	pub fn config(&self) -> &ParserConfig {
		&self.config
	}

	/// The role this parser validates masking for.
	pub fn behavior(&self) -> Behavior {
		self.config.behavior
	}

	/// Whether a protocol error has stopped this parser.
	pub fn is_failed(&self) -> bool {
		self.state == State::Failed
	}

	/// Whether part of a frame has been consumed but not yet emitted.
	pub fn is_mid_frame(&self) -> bool {
		match self.state {
			State::Start => self.filled > 0,
			State::Failed => false,
			_ => true,
		}
	}

	/// Drops any partial frame and clears a failure, ready for a new stream.
	pub fn reset(&mut self) {
		self.reset_frame();
		self.payload = Vec::new();
	}

	/// Decodes every complete frame in `buf`, handing each to `handler`.
	///
	/// All of `buf` is consumed unless an error stops parsing early. Bytes
	/// belonging to an unfinished frame are retained for the next call.
	pub fn parse<B, H>(&mut self, buf: &mut B, handler: &mut H) -> WebSocketResult<()>
	where
		B: Buf,
		H: FrameHandler + ?Sized,
	{
		while let Some(frame) = self.next_frame(buf)? {
			handler.on_frame(frame)?;
		}
		Ok(())
	}

	/// Consumes bytes from `buf` until one frame is complete.
	///
	/// Returns `Ok(None)` when `buf` runs out first; that is not an error, the
	/// partial frame is kept and completed by later calls.
	pub fn next_frame<B: Buf>(&mut self, buf: &mut B) -> WebSocketResult<Option<Frame>> {
		if self.state == State::Failed {
			return Err(WebSocketError::ProtocolError(
				"Parser stopped after an earlier protocol error",
			));
		}
		match self.step(buf) {
			Ok(frame) => Ok(frame),
			Err(err) => {
				debug!(error = %err, behavior = ?self.config.behavior, "WebSocket frame rejected");
				self.state = State::Failed;
				Err(err)
			}
		}
	}

	fn step<B: Buf>(&mut self, buf: &mut B) -> WebSocketResult<Option<Frame>> {
		loop {
			match self.state {
				State::Start => {
					if !self.fill(buf, 2) {
						return Ok(None);
					}
					self.filled = 0;
					let (byte0, byte1) = (self.scratch[0], self.scratch[1]);
					self.read_fixed_header(byte0, byte1)?;
				}
				State::PayloadLength => {
					if !self.fill(buf, self.encoding.extra_bytes()) {
						return Ok(None);
					}
					self.filled = 0;
					let len = match self.encoding {
						LengthEncoding::Extended16 => u64::from(BigEndian::read_u16(&self.scratch[..2])),
						_ => BigEndian::read_u64(&self.scratch[..8]),
					};
					self.set_length(len)?;
				}
				State::MaskKey => {
					if !self.fill(buf, MASK_KEY_LENGTH) {
						return Ok(None);
					}
					self.filled = 0;
					let mut key = [0u8; 4];
					key.copy_from_slice(&self.scratch[..MASK_KEY_LENGTH]);
					self.mask = Some(key);
					self.start_payload();
				}
				State::Payload => return Ok(self.read_payload(buf)),
				State::Failed => {
					return Err(WebSocketError::ProtocolError(
						"Parser stopped after an earlier protocol error",
					));
				}
			}
		}
	}

	/// Copies header bytes into the scratch area until it holds `needed`.
	fn fill<B: Buf>(&mut self, buf: &mut B, needed: usize) -> bool {
		let take = cmp::min(needed - self.filled, buf.remaining());
		if take > 0 {
			buf.copy_to_slice(&mut self.scratch[self.filled..self.filled + take]);
			self.filled += take;
		}
		self.filled == needed
	}

	fn read_fixed_header(&mut self, byte0: u8, byte1: u8) -> WebSocketResult<()> {
		let flags = DataFrameFlags::from_bits_truncate(byte0);
		let opcode = Opcode::new(byte0 & 0x0F)
			.ok_or(WebSocketError::ProtocolError("Invalid data frame opcode"))?;
		let masked = byte1 & MASK_BIT != 0;

		if self.config.reserved_bits == ReservedBits::Reject
			&& flags.intersects(DataFrameFlags::RSV1 | DataFrameFlags::RSV2 | DataFrameFlags::RSV3)
		{
			return Err(WebSocketError::ProtocolError(
				"Reserved bits set without a negotiated extension",
			));
		}
		if self.config.unknown_opcodes == UnknownOpcodes::Reject && opcode.is_reserved() {
			return Err(WebSocketError::ProtocolError("Unknown data frame opcode"));
		}
		match (self.config.behavior, masked) {
			(Behavior::Server, false) => {
				return Err(WebSocketError::ProtocolError("Expected masked data frame"));
			}
			(Behavior::Client, true) => {
				return Err(WebSocketError::ProtocolError(
					"Expected unmasked data frame",
				));
			}
			_ => {}
		}
		if opcode.is_control() && !flags.contains(DataFrameFlags::FIN) {
			return Err(WebSocketError::ProtocolError(
				"Illegal fragmented control frame",
			));
		}

		self.flags = flags;
		self.opcode = opcode;
		self.masked = masked;

		let code = byte1 & 0x7F;
		self.encoding = LengthEncoding::for_code(code);
		match self.encoding {
			LengthEncoding::Direct => self.set_length(u64::from(code)),
			_ => {
				self.state = State::PayloadLength;
				Ok(())
			}
		}
	}

	fn set_length(&mut self, len: u64) -> WebSocketResult<()> {
		if self.encoding != LengthEncoding::Direct && !self.encoding.is_minimal(len) {
			return Err(WebSocketError::ProtocolError("Invalid data frame length"));
		}
		if len >> 63 != 0 {
			return Err(WebSocketError::ProtocolError(
				"Data frame length has its most significant bit set",
			));
		}
		if self.opcode.is_control() && len > MAX_CONTROL_PAYLOAD as u64 {
			return Err(WebSocketError::ProtocolError(
				"Control frame length too long",
			));
		}
		let fragmenting = self.config.auto_fragment && !self.opcode.is_control();
		if len > self.config.max_frame_size && !fragmenting {
			return Err(WebSocketError::FrameTooLarge {
				length: len,
				max: self.config.max_frame_size,
			});
		}

		self.remaining = len;
		if self.masked {
			self.state = State::MaskKey;
		} else {
			self.start_payload();
		}
		Ok(())
	}

	fn start_payload(&mut self) {
		let reserve = cmp::min(self.fragment_target(), INITIAL_PAYLOAD_RESERVE);
		self.payload = Vec::with_capacity(reserve as usize);
		self.state = State::Payload;
	}

	/// Payload bytes to collect before the next frame can be emitted.
	fn fragment_target(&self) -> u64 {
		if self.config.auto_fragment && !self.opcode.is_control() {
			cmp::min(self.remaining, cmp::max(self.config.max_frame_size, 1))
		} else {
			self.remaining
		}
	}

	fn read_payload<B: Buf>(&mut self, buf: &mut B) -> Option<Frame> {
		let target = self.fragment_target();
		while (self.payload.len() as u64) < target && buf.has_remaining() {
			let wanted = target - self.payload.len() as u64;
			let chunk = buf.chunk();
			let take = cmp::min(chunk.len() as u64, wanted) as usize;
			let start = self.payload.len();
			self.payload.extend_from_slice(&chunk[..take]);
			buf.advance(take);

			if let Some(key) = self.mask {
				mask::apply_mask(&mut self.payload[start..], key, self.mask_offset);
				self.mask_offset = (self.mask_offset + take) & 3;
			}
		}

		if (self.payload.len() as u64) < target {
			return None;
		}
		Some(self.emit())
	}

	fn emit(&mut self) -> Frame {
		self.remaining -= self.payload.len() as u64;
		let last = self.remaining == 0;
		let first = self.fragments == 0;

		let frame = Frame {
			fin: last && self.flags.contains(DataFrameFlags::FIN),
			reserved: if first { self.flags.reserved() } else { [false; 3] },
			opcode: if first { self.opcode } else { Opcode::Continuation },
			mask: self.mask,
			payload: mem::replace(&mut self.payload, Vec::new()),
		};

		trace!(
			fin = frame.fin,
			opcode = %frame.opcode,
			masked = frame.is_masked(),
			payload_len = frame.payload.len(),
			fragment = self.fragments,
			"Parsed WebSocket frame"
		);

		if last {
			self.reset_frame();
		} else {
			self.fragments += 1;
			self.start_payload();
		}
		frame
	}

	fn reset_frame(&mut self) {
		self.state = State::Start;
		self.filled = 0;
		self.flags = DataFrameFlags::empty();
		self.opcode = Opcode::Continuation;
		self.encoding = LengthEncoding::Direct;
		self.masked = false;
		self.mask = None;
		self.mask_offset = 0;
		self.remaining = 0;
		self.fragments = 0;
	}
}

/// Parses exactly one frame from a complete byte slice.
///
/// Returns the frame and the number of bytes it occupied, or
/// `WebSocketError::IncompleteInput` if `data` ends before the frame does.
/// With auto-fragmentation enabled only the first fragment is returned.
pub fn decode(data: &[u8], config: ParserConfig) -> WebSocketResult<(Frame, usize)> {
	let mut parser = Parser::new(config);
	let mut rest = data;
	match parser.next_frame(&mut rest)? {
		Some(frame) => Ok((frame, data.len() - rest.len())),
		None => Err(WebSocketError::IncompleteInput),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn client() -> Parser {
		Parser::new(ParserConfig::client())
	}

	fn parse_all(parser: &mut Parser, mut data: &[u8]) -> WebSocketResult<Vec<Frame>> {
		let mut frames = Vec::new();
		parser.parse(&mut data, &mut frames)?;
		Ok(frames)
	}

	#[test]
	fn test_read_dataframe() {
		let data = b"The quick brown fox jumps over the lazy dog";
		let mut wire = vec![0x81, 0x2B];
		wire.extend_from_slice(data);

		let frames = parse_all(&mut client(), &wire).unwrap();
		let expected = Frame {
			fin: true,
			reserved: [false; 3],
			opcode: Opcode::Text,
			mask: None,
			payload: data.to_vec(),
		};
		assert_eq!(frames, vec![expected]);
	}

	#[test]
	fn read_incomplete_payloads() {
		let data = vec![0x8au8, 0x08, 0x19, 0xac, 0xab, 0x8a, 0x52, 0x4e, 0x05, 0x00];
		let payload = vec![25, 172, 171, 138, 82, 78, 5, 0];
		let mut parser = client();

		assert!(parse_all(&mut parser, &data[..1]).unwrap().is_empty());
		assert!(parser.is_mid_frame());
		assert!(parse_all(&mut parser, &data[1..6]).unwrap().is_empty());
		let frames = parse_all(&mut parser, &data[6..]).unwrap();
		assert_eq!(frames.len(), 1);
		assert_eq!(frames[0].opcode, Opcode::Pong);
		assert_eq!(frames[0].payload, payload);
		assert!(!parser.is_mid_frame());
	}

	#[test]
	fn reads_masked_frame_with_reserved_bit() {
		let mut wire = vec![0x42, 0xFE, 0x02, 0x00, 0x02, 0x04, 0x08, 0x10];
		let raw: Vec<u8> = (0..512u32).map(|i| i as u8).collect();
		wire.extend(mask::mask_data([2, 4, 8, 16], &raw));

		let config = ParserConfig::server().with_reserved_bits(ReservedBits::Allow);
		let frames = parse_all(&mut Parser::new(config), &wire).unwrap();
		assert_eq!(frames.len(), 1);
		let frame = &frames[0];
		assert!(!frame.fin);
		assert_eq!(frame.reserved, [true, false, false]);
		assert_eq!(frame.opcode, Opcode::Binary);
		assert_eq!(frame.mask, Some([2, 4, 8, 16]));
		assert_eq!(frame.payload, raw);
	}

	#[test]
	fn one_byte_at_a_time() {
		let raw = b"0123456789ABCDEF".to_vec();
		let mut wire = vec![0x81, 0x90, 0x37, 0xfa, 0x21, 0x3d];
		wire.extend(mask::mask_data([0x37, 0xfa, 0x21, 0x3d], &raw));

		let mut parser = Parser::new(ParserConfig::server());
		let mut frames = Vec::new();
		for byte in &wire {
			let mut chunk = &[*byte][..];
			parser.parse(&mut chunk, &mut frames).unwrap();
			assert!(chunk.is_empty());
		}
		assert_eq!(frames.len(), 1);
		assert_eq!(frames[0].payload, raw);
	}

	#[test]
	fn several_frames_in_one_buffer() {
		let wire = [0x89, 0x00, 0x82, 0x02, 0xAA, 0xBB, 0x88, 0x02, 0x03, 0xE8];
		let frames = parse_all(&mut client(), &wire).unwrap();
		assert_eq!(frames.len(), 3);
		assert_eq!(frames[0], Frame::ping(Vec::<u8>::new()));
		assert_eq!(frames[1], Frame::binary(vec![0xAAu8, 0xBB]));
		assert_eq!(frames[2].close_code_and_reason(), Some((1000, String::new())));
	}

	#[test]
	fn zero_length_frame_emits_without_more_input() {
		let mut parser = client();
		let mut wire = &[0x81u8, 0x00][..];
		let frame = parser.next_frame(&mut wire).unwrap().unwrap();
		assert!(frame.payload.is_empty());
		assert_eq!(parser.next_frame(&mut wire).unwrap(), None);
	}

	#[test]
	fn masking_direction_is_enforced() {
		let unmasked = [0x81, 0x01, b'a'];
		let err = parse_all(&mut Parser::new(ParserConfig::server()), &unmasked).unwrap_err();
		assert_eq!(err, WebSocketError::ProtocolError("Expected masked data frame"));

		let masked = [0x81, 0x81, 1, 2, 3, 4, b'a' ^ 1];
		let err = parse_all(&mut client(), &masked).unwrap_err();
		assert!(err.is_protocol_error());
	}

	#[test]
	fn failure_is_sticky_until_reset() {
		let mut parser = client();
		assert!(parse_all(&mut parser, &[0x81, 0x81, 0, 0, 0, 0, 0]).is_err());
		assert!(parser.is_failed());

		let mut good = &[0x81u8, 0x01, b'x'][..];
		assert!(parser.next_frame(&mut good).is_err());
		assert_eq!(good.len(), 3);

		parser.reset();
		assert!(!parser.is_failed());
		assert_eq!(parser.next_frame(&mut good).unwrap(), Some(Frame::text("x")));
	}

	#[test]
	fn control_frame_rules() {
		// fragmented ping
		assert!(parse_all(&mut client(), &[0x09, 0x00]).is_err());
		// 126 byte close frame
		assert!(parse_all(&mut client(), &[0x88, 0x7E, 0x00, 0x7E]).is_err());
	}

	#[test]
	fn length_must_be_minimally_encoded() {
		let err = parse_all(&mut client(), &[0x82, 0x7E, 0x00, 0x7D]).unwrap_err();
		assert_eq!(err, WebSocketError::ProtocolError("Invalid data frame length"));

		let err = parse_all(&mut client(), &[0x82, 0x7F, 0, 0, 0, 0, 0, 0, 0xFF, 0xFF]).unwrap_err();
		assert_eq!(err, WebSocketError::ProtocolError("Invalid data frame length"));

		let err = parse_all(&mut client(), &[0x82, 0x7F, 0x80, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
		assert!(err.is_protocol_error());
	}

	#[test]
	fn frame_size_limit() {
		let mut parser = Parser::new(ParserConfig::client().with_max_frame_size(10));
		let err = parse_all(&mut parser, &[0x81, 0x64]).unwrap_err();
		assert_eq!(err, WebSocketError::FrameTooLarge { length: 100, max: 10 });
	}

	#[test]
	fn reserved_bits_policy() {
		let wire = [0xC1, 0x01, b'z'];
		assert!(parse_all(&mut client(), &wire).is_err());

		let config = ParserConfig::client().with_reserved_bits(ReservedBits::Allow);
		let frames = parse_all(&mut Parser::new(config), &wire).unwrap();
		assert_eq!(frames[0].reserved, [true, false, false]);
	}

	#[test]
	fn unknown_opcode_policy() {
		let wire = [0x83, 0x01, 0x07];
		let err = parse_all(&mut client(), &wire).unwrap_err();
		assert_eq!(err, WebSocketError::ProtocolError("Unknown data frame opcode"));

		let config = ParserConfig::client().with_unknown_opcodes(UnknownOpcodes::Allow);
		let frames = parse_all(&mut Parser::new(config), &wire).unwrap();
		assert_eq!(frames[0].opcode, Opcode::NonControl(3));
	}

	#[test]
	fn auto_fragment_splits_large_data_frames() {
		let raw: Vec<u8> = (0..25u8).collect();
		let key = [9, 8, 7, 6];
		let mut wire = vec![0x42, 0x80 | 25];
		wire.extend_from_slice(&key);
		wire.extend(mask::mask_data(key, &raw));

		let config = ParserConfig::server()
			.with_max_frame_size(10)
			.with_auto_fragment(true)
			.with_reserved_bits(ReservedBits::Allow);
		let frames = parse_all(&mut Parser::new(config), &wire).unwrap();

		assert_eq!(frames.len(), 3);
		assert_eq!(frames[0].opcode, Opcode::Binary);
		assert_eq!(frames[0].reserved, [true, false, false]);
		assert_eq!(frames[1].opcode, Opcode::Continuation);
		assert_eq!(frames[1].reserved, [false; 3]);
		assert_eq!(frames[2].opcode, Opcode::Continuation);
		// the wire frame had FIN unset, so no fragment may claim it
		assert!(frames.iter().all(|f| !f.fin));
		assert_eq!(frames[2].payload.len(), 5);

		let joined: Vec<u8> = frames.into_iter().flat_map(|f| f.payload).collect();
		assert_eq!(joined, raw);
	}

	#[test]
	fn auto_fragment_sets_fin_on_last_piece() {
		let mut wire = vec![0x81, 20];
		wire.extend_from_slice(b"abcdefghijklmnopqrst");
		let config = ParserConfig::client()
			.with_max_frame_size(10)
			.with_auto_fragment(true);
		let frames = parse_all(&mut Parser::new(config), &wire).unwrap();
		assert_eq!(frames.len(), 2);
		assert!(!frames[0].fin);
		assert!(frames[1].fin);
		assert_eq!(frames[1].payload, b"klmnopqrst".to_vec());
	}

	#[test]
	fn auto_fragment_unmasks_across_chunked_input() {
		let raw: Vec<u8> = (0..1000u32).map(|i| (i * 31 + 7) as u8).collect();
		let key = [0x5A, 0x01, 0xC3, 0x7E];
		let mut wire = vec![0x82, 0x80 | 126, 0x03, 0xE8];
		wire.extend_from_slice(&key);
		wire.extend(mask::mask_data(key, &raw));

		for size in 1..20 {
			let config = ParserConfig::server()
				.with_max_frame_size(37)
				.with_auto_fragment(true);
			let mut parser = Parser::new(config);
			let mut frames = Vec::<Frame>::new();
			for chunk in wire.chunks(size) {
				let mut chunk = chunk;
				parser.parse(&mut chunk, &mut frames).unwrap();
				assert!(chunk.is_empty());
			}
			assert!(!parser.is_mid_frame());

			assert_eq!(frames.len(), 28, "chunk size {}", size);
			assert_eq!(frames[0].opcode, Opcode::Binary);
			assert!(frames[1..].iter().all(|f| f.opcode == Opcode::Continuation));
			assert!(frames.iter().all(|f| f.payload.len() <= 37));
			assert!(frames[27].fin);
			assert!(frames[..27].iter().all(|f| !f.fin));

			let joined: Vec<u8> = frames.into_iter().flat_map(|f| f.payload).collect();
			assert_eq!(joined, raw, "chunk size {}", size);
		}
	}

	#[test]
	fn decode_reports_incomplete_input() {
		let wire = [0x82, 0x03, 1, 2, 3, 0x89];
		let (frame, used) = decode(&wire, ParserConfig::client()).unwrap();
		assert_eq!(frame.payload, vec![1, 2, 3]);
		assert_eq!(used, 5);

		assert_eq!(
			decode(&wire[..4], ParserConfig::client()).unwrap_err(),
			WebSocketError::IncompleteInput
		);
	}
}
