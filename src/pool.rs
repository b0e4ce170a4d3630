//! Reusable fixed-capacity byte buffers.
//!
//! The codec never allocates or grows the buffers it writes into; callers
//! acquire one from a `ByteBufferPool` sized for the frame they are about to
//! generate, and hand it back when the bytes have been consumed.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::buf::Limit;
use bytes::{BufMut, BytesMut};
use tracing::trace;

/// Configuration for a buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
	/// Most released buffers kept for reuse; extras are freed.
	pub max_retained: usize,
	/// Released buffers larger than this are freed rather than kept.
	pub max_buffer_size: usize,
}

impl Default for PoolConfig {
	fn default() -> Self {
		PoolConfig {
			max_retained: 64,
			max_buffer_size: 1024 * 1024,
		}
	}
}

/// Pool usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
	/// Buffers handed out
	pub acquisitions: u64,
	/// Acquisitions served from the free list
	pub hits: u64,
	/// Acquisitions that had to allocate
	pub misses: u64,
	/// Buffers given back
	pub releases: u64,
	/// Buffers currently held for reuse
	pub retained: usize,
}

struct PoolState {
	free: Vec<BytesMut>,
	stats: PoolStats,
}

struct PoolInner {
	config: PoolConfig,
	state: Mutex<PoolState>,
}

impl PoolInner {
	fn lock(&self) -> MutexGuard<PoolState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn give_back(&self, mut buf: BytesMut) {
		let mut state = self.lock();
		state.stats.releases += 1;
		if state.free.len() < self.config.max_retained && buf.capacity() <= self.config.max_buffer_size {
			buf.clear();
			state.free.push(buf);
		}
		state.stats.retained = state.free.len();
	}
}

/// A thread-safe pool of byte buffers.
///
/// Cloning the pool gives another handle to the same free list.
#[derive(Clone)]
pub struct ByteBufferPool {
	inner: Arc<PoolInner>,
}

impl ByteBufferPool {
	/// Creates an empty pool.
	pub fn new(config: PoolConfig) -> Self {
		ByteBufferPool {
			inner: Arc::new(PoolInner {
				config,
				state: Mutex::new(PoolState {
					free: Vec::new(),
					stats: PoolStats::default(),
				}),
			}),
		}
	}

	/// Hands out an empty buffer that accepts exactly `size` bytes.
	pub fn acquire(&self, size: usize) -> PooledBuffer {
		let mut state = self.inner.lock();
		state.stats.acquisitions += 1;
		let reusable = state.free.iter().position(|buf| buf.capacity() >= size);
		let buf = match reusable {
			Some(index) => {
				state.stats.hits += 1;
				state.free.swap_remove(index)
			}
			None => {
				state.stats.misses += 1;
				BytesMut::with_capacity(size)
			}
		};
		state.stats.retained = state.free.len();
		drop(state);

		trace!(size, "Acquired pooled buffer");
		PooledBuffer {
			buf,
			limit: size,
			pool: Arc::clone(&self.inner),
		}
	}

	/// A snapshot of the pool statistics.
	pub fn stats(&self) -> PoolStats {
		self.inner.lock().stats
	}
}

impl Default for ByteBufferPool {
	fn default() -> Self {
		ByteBufferPool::new(PoolConfig::default())
	}
}

/// A buffer on loan from a `ByteBufferPool`.
///
/// It returns to the pool on `release` or when dropped.
pub struct PooledBuffer {
	buf: BytesMut,
	limit: usize,
	pool: Arc<PoolInner>,
}

impl PooledBuffer {
	/// Total bytes this buffer accepts.
	pub fn capacity(&self) -> usize {
		self.limit
	}

	/// Bytes written so far.
	pub fn len(&self) -> usize {
		self.buf.len()
	}

	/// Whether nothing has been written yet.
	pub fn is_empty(&self) -> bool {
		self.buf.is_empty()
	}

	/// Bytes that can still be written.
	pub fn remaining_capacity(&self) -> usize {
		self.limit - self.buf.len()
	}

	/// A writer that refuses to go past the buffer's capacity.
	pub fn writer(&mut self) -> Limit<&mut BytesMut> {
		let room = self.remaining_capacity();
		(&mut self.buf).limit(room)
	}

	/// The bytes written so far.
	pub fn as_bytes(&self) -> &[u8] {
		&self.buf
	}

	/// Discards the written bytes.
	pub fn clear(&mut self) {
		self.buf.clear();
	}

	/// Returns the buffer to its pool.
	pub fn release(self) {}
}

impl Drop for PooledBuffer {
	fn drop(&mut self) {
		let buf = mem::take(&mut self.buf);
		self.pool.give_back(buf);
	}
}
