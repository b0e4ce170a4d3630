//! Generation and parsing of WebSocket frames over in-memory buffers.
//!
//! The `generator` module writes frames into any `bytes::BufMut`, the `parser`
//! module reads them back out of any `bytes::Buf`, however the bytes happen to
//! be chunked. Neither owns or grows buffers; sizing them is up to the caller
//! (see `Generator::frame_length` and the `pool` module).

pub mod generator;
pub mod parser;

pub use self::generator::Generator;
pub use self::parser::{decode, FrameHandler, Parser};

/// Default upper bound on an incoming frame payload.
pub const DEFAULT_MAX_FRAME_SIZE: u64 = 1024 * 1024 * 100;

/// Even though a websocket connection may look perfectly symmetrical
/// in reality there are small differences between clients and servers.
/// This type is passed to the parser to inform it of what role it is in
/// (i.e. that of a Client or Server).
///
/// For those familiar with the protocol, this decides whether incoming data
/// must be masked or not.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Behavior {
	/// Reading frames sent by a client: every frame must be masked.
	Server,
	/// Reading frames sent by a server: no frame may be masked.
	Client,
}

impl Behavior {
	/// Whether frames arriving at this side must carry a mask.
	pub fn expects_masked(self) -> bool {
		self == Behavior::Server
	}
}

/// What to do with frames that set RSV1, RSV2 or RSV3.
///
/// Without a negotiated extension the bits have no meaning, so they are
/// rejected unless the caller layers an extension on top of the codec.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReservedBits {
	/// Fail the stream on any reserved bit.
	Reject,
	/// Pass the bits through on the decoded frame.
	Allow,
}

/// What to do with opcodes RFC6455 leaves undefined (3-7, 11-15).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnknownOpcodes {
	/// Fail the stream.
	Reject,
	/// Decode them like any other frame of their class.
	Allow,
}

/// Parser configuration.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ParserConfig {
	/// Role of the side doing the parsing
	pub behavior: Behavior,
	/// Largest payload accepted in a single frame
	pub max_frame_size: u64,
	/// Reserved bit policy
	pub reserved_bits: ReservedBits,
	/// Undefined opcode policy
	pub unknown_opcodes: UnknownOpcodes,
	/// Split oversized data frames instead of rejecting them
	pub auto_fragment: bool,
}

impl ParserConfig {
	/// Configuration for the given role with default limits and strict policies.
	pub fn new(behavior: Behavior) -> ParserConfig {
		ParserConfig {
			behavior,
			max_frame_size: DEFAULT_MAX_FRAME_SIZE,
			reserved_bits: ReservedBits::Reject,
			unknown_opcodes: UnknownOpcodes::Reject,
			auto_fragment: false,
		}
	}

	/// Configuration for a server reading client frames.
	pub fn server() -> ParserConfig {
		ParserConfig::new(Behavior::Server)
	}

	/// Configuration for a client reading server frames.
	pub fn client() -> ParserConfig {
		ParserConfig::new(Behavior::Client)
	}

	/// Sets the maximum frame payload size.
	pub fn with_max_frame_size(mut self, size: u64) -> ParserConfig {
		self.max_frame_size = size;
		self
	}

	/// Sets the reserved bit policy.
	pub fn with_reserved_bits(mut self, policy: ReservedBits) -> ParserConfig {
		self.reserved_bits = policy;
		self
	}

	/// Sets the undefined opcode policy.
	pub fn with_unknown_opcodes(mut self, policy: UnknownOpcodes) -> ParserConfig {
		self.unknown_opcodes = policy;
		self
	}

	/// Deliver data frames above `max_frame_size` as several fragments.
	pub fn with_auto_fragment(mut self, enabled: bool) -> ParserConfig {
		self.auto_fragment = enabled;
		self
	}
}

impl Default for ParserConfig {
	/// A client-side configuration.
	fn default() -> ParserConfig {
		ParserConfig::client()
	}
}
