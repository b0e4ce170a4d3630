//! Bit layout and sizing of data frame headers.

use byteorder::{BigEndian, ByteOrder};

bitflags! {
	/// Flags relevant to a WebSocket data frame.
	pub struct DataFrameFlags: u8 {
		/// Marks this dataframe as the last dataframe
		const FIN = 0x80;
		/// First reserved bit
		const RSV1 = 0x40;
		/// Second reserved bit
		const RSV2 = 0x20;
		/// Third reserved bit
		const RSV3 = 0x10;
	}
}

impl DataFrameFlags {
	/// Builds the flag set from a `fin` bit and the three reserved bits.
	pub fn from_parts(fin: bool, reserved: [bool; 3]) -> DataFrameFlags {
		let mut flags = DataFrameFlags::empty();
		flags.set(DataFrameFlags::FIN, fin);
		flags.set(DataFrameFlags::RSV1, reserved[0]);
		flags.set(DataFrameFlags::RSV2, reserved[1]);
		flags.set(DataFrameFlags::RSV3, reserved[2]);
		flags
	}

	/// The reserved bits as `[rsv1, rsv2, rsv3]`.
	pub fn reserved(self) -> [bool; 3] {
		[
			self.contains(DataFrameFlags::RSV1),
			self.contains(DataFrameFlags::RSV2),
			self.contains(DataFrameFlags::RSV3),
		]
	}
}

/// Mask bit of the second header byte.
pub const MASK_BIT: u8 = 0x80;

/// Largest length that fits in the 7-bit length field.
pub const MAX_DIRECT_LENGTH: u64 = 125;

/// Length code announcing a 16-bit extended length.
pub const EXTENDED_16: u8 = 126;

/// Length code announcing a 64-bit extended length.
pub const EXTENDED_64: u8 = 127;

/// Size of a masking key on the wire.
pub const MASK_KEY_LENGTH: usize = 4;

/// The three ways RFC6455 encodes a payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthEncoding {
	/// Length stored in the 7 low bits of the second byte
	Direct,
	/// Code 126 followed by 2 big-endian bytes
	Extended16,
	/// Code 127 followed by 8 big-endian bytes
	Extended64,
}

impl LengthEncoding {
	/// Smallest encoding able to represent `len`.
	pub fn for_length(len: u64) -> LengthEncoding {
		if len <= MAX_DIRECT_LENGTH {
			LengthEncoding::Direct
		} else if len <= u64::from(u16::max_value()) {
			LengthEncoding::Extended16
		} else {
			LengthEncoding::Extended64
		}
	}

	/// Encoding announced by a 7-bit length code, if it is an extended one.
	pub fn for_code(code: u8) -> LengthEncoding {
		match code & 0x7F {
			EXTENDED_16 => LengthEncoding::Extended16,
			EXTENDED_64 => LengthEncoding::Extended64,
			_ => LengthEncoding::Direct,
		}
	}

	/// Number of extended length bytes following the second header byte.
	pub fn extra_bytes(self) -> usize {
		match self {
			LengthEncoding::Direct => 0,
			LengthEncoding::Extended16 => 2,
			LengthEncoding::Extended64 => 8,
		}
	}

	/// Whether `len` is the shortest form for this encoding (RFC6455 5.2).
	pub fn is_minimal(self, len: u64) -> bool {
		LengthEncoding::for_length(len) == self
	}
}

/// Size of a header for a payload of `len` bytes, mask key included.
pub fn header_length(len: u64, masked: bool) -> usize {
	2 + LengthEncoding::for_length(len).extra_bytes() + if masked { MASK_KEY_LENGTH } else { 0 }
}

/// Encodes a full header into `out`, returning how many bytes were used.
///
/// `out` must hold at least 14 bytes, the longest possible header.
pub fn encode_header(
	flags: DataFrameFlags,
	opcode: u8,
	mask: Option<[u8; 4]>,
	len: u64,
	out: &mut [u8; 14],
) -> usize {
	let encoding = LengthEncoding::for_length(len);

	// 'FIN', 'RSV1', 'RSV2', 'RSV3' and 'opcode'
	out[0] = flags.bits() | (opcode & 0x0F);

	// 'MASK' and 'Payload len'
	let mask_bit = if mask.is_some() { MASK_BIT } else { 0 };
	out[1] = mask_bit
		| match encoding {
			LengthEncoding::Direct => len as u8,
			LengthEncoding::Extended16 => EXTENDED_16,
			LengthEncoding::Extended64 => EXTENDED_64,
		};

	let mut pos = 2;
	match encoding {
		LengthEncoding::Direct => {}
		LengthEncoding::Extended16 => {
			BigEndian::write_u16(&mut out[pos..pos + 2], len as u16);
			pos += 2;
		}
		LengthEncoding::Extended64 => {
			BigEndian::write_u64(&mut out[pos..pos + 8], len);
			pos += 8;
		}
	}

	if let Some(key) = mask {
		out[pos..pos + MASK_KEY_LENGTH].copy_from_slice(&key);
		pos += MASK_KEY_LENGTH;
	}

	pos
}
