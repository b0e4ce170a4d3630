//! Utility functions for masking data frame payload data

/// Generates a random masking key
pub fn gen_mask() -> [u8; 4] {
	rand::random()
}

/// XORs `data` in place with `key`, treating `data[0]` as payload byte `offset`.
///
/// Masking is its own inverse, so this both masks and unmasks. The offset lets
/// a payload be processed in pieces: calling this on consecutive slices with
/// the running byte count gives the same result as one call over the whole.
#[inline]
pub fn apply_mask(data: &mut [u8], key: [u8; 4], offset: usize) {
	for (i, byte) in data.iter_mut().enumerate() {
		*byte ^= key[(offset + i) & 3];
	}
}

/// Masks data into a new buffer
pub fn mask_data(key: [u8; 4], data: &[u8]) -> Vec<u8> {
	let mut out = data.to_vec();
	apply_mask(&mut out, key, 0);
	out
}
