//! Hand-off of parsed frames to consumers running on their own schedule.
//!
//! A `FrameSink` owns a `Parser` and pushes every frame it decodes onto a
//! FIFO queue. Consumers hold `FrameQueue` handles and `poll` them with a
//! timeout, possibly from other threads.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Buf;
use tracing::{debug, trace};

use crate::codec::{FrameHandler, Parser, ParserConfig};
use crate::dataframe::Frame;
use crate::result::{WebSocketError, WebSocketResult};

struct Inner {
	frames: VecDeque<Frame>,
	closed: bool,
}

struct Shared {
	inner: Mutex<Inner>,
	capacity: Option<usize>,
	not_empty: Condvar,
	not_full: Condvar,
}

impl Shared {
	fn lock(&self) -> MutexGuard<Inner> {
		self.inner.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn is_full(&self, inner: &Inner) -> bool {
		match self.capacity {
			Some(capacity) => inner.frames.len() >= capacity,
			None => false,
		}
	}

	fn push(&self, frame: Frame) -> WebSocketResult<()> {
		let mut inner = self.lock();
		while !inner.closed && self.is_full(&inner) {
			inner = self
				.not_full
				.wait(inner)
				.unwrap_or_else(PoisonError::into_inner);
		}
		if inner.closed {
			return Err(WebSocketError::QueueClosed);
		}
		inner.frames.push_back(frame);
		trace!(queued = inner.frames.len(), "Frame queued");
		drop(inner);
		self.not_empty.notify_one();
		Ok(())
	}

	fn close(&self) {
		self.lock().closed = true;
		self.not_empty.notify_all();
		self.not_full.notify_all();
	}
}

/// Consumer side of a `FrameSink`.
///
/// Handles are cheap to clone; every frame is delivered to exactly one of
/// them, in the order the parser produced the frames.
#[derive(Clone)]
pub struct FrameQueue {
	shared: Arc<Shared>,
}

impl FrameQueue {
	/// Waits up to `timeout` for the next frame.
	///
	/// Returns `None` if nothing arrived in time, or straight away once the
	/// sink has been dropped and every queued frame has been taken. A timeout
	/// too large to form a deadline, such as `Duration::MAX`, waits without one.
	pub fn poll(&self, timeout: Duration) -> Option<Frame> {
		let deadline = Instant::now().checked_add(timeout);
		let mut inner = self.shared.lock();
		loop {
			if let Some(frame) = inner.frames.pop_front() {
				drop(inner);
				self.shared.not_full.notify_one();
				return Some(frame);
			}
			if inner.closed {
				return None;
			}
			inner = match deadline {
				Some(deadline) => {
					let now = Instant::now();
					if now >= deadline {
						return None;
					}
					self.shared
						.not_empty
						.wait_timeout(inner, deadline - now)
						.unwrap_or_else(PoisonError::into_inner)
						.0
				}
				None => self
					.shared
					.not_empty
					.wait(inner)
					.unwrap_or_else(PoisonError::into_inner),
			};
		}
	}

	/// Takes the next frame if one is already queued.
	pub fn try_poll(&self) -> Option<Frame> {
		let frame = self.shared.lock().frames.pop_front();
		if frame.is_some() {
			self.shared.not_full.notify_one();
		}
		frame
	}

	/// Number of frames waiting.
	pub fn len(&self) -> usize {
		self.shared.lock().frames.len()
	}

	/// Whether no frames are waiting.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Whether the producing sink is gone.
	pub fn is_closed(&self) -> bool {
		self.shared.lock().closed
	}
}

/// Drives a `Parser` and queues what it decodes.
///
/// `parse` is synchronous and must be called from one thread at a time, the
/// same as the parser underneath it. With a bounded queue a `parse` call
/// blocks while the queue is full, so bounded sinks need a consumer draining
/// them concurrently.
pub struct FrameSink {
	parser: Parser,
	queue: FrameQueue,
}

impl FrameSink {
	/// A sink with an unbounded queue.
	pub fn new(config: ParserConfig) -> FrameSink {
		FrameSink::with_capacity(config, None)
	}

	/// A sink whose queue holds at most `capacity` frames.
	pub fn bounded(config: ParserConfig, capacity: usize) -> FrameSink {
		FrameSink::with_capacity(config, Some(capacity.max(1)))
	}

	fn with_capacity(config: ParserConfig, capacity: Option<usize>) -> FrameSink {
		let shared = Shared {
			inner: Mutex::new(Inner {
				frames: VecDeque::new(),
				closed: false,
			}),
			capacity,
			not_empty: Condvar::new(),
			not_full: Condvar::new(),
		};
		FrameSink {
			parser: Parser::new(config),
			queue: FrameQueue {
				shared: Arc::new(shared),
			},
		}
	}

	/// Parses `buf`, queueing every completed frame.
	pub fn parse<B: Buf>(&mut self, buf: &mut B) -> WebSocketResult<()> {
		let FrameSink { parser, queue } = self;
		parser.parse(buf, queue)
	}

	/// A consumer handle for the queue.
	pub fn frames(&self) -> FrameQueue {
		self.queue.clone()
	}

	/// The parser being driven.
	pub fn parser(&self) -> &Parser {
		&self.parser
	}
}

impl FrameHandler for FrameQueue {
	fn on_frame(&mut self, frame: Frame) -> WebSocketResult<()> {
		self.shared.push(frame)
	}
}

impl Drop for FrameSink {
	fn drop(&mut self) {
		debug!(pending = self.queue.len(), "Frame sink closed");
		self.queue.shared.close();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::thread;

	const WAIT: Duration = Duration::from_secs(1);

	#[test]
	fn frames_come_out_in_order() {
		let mut sink = FrameSink::new(ParserConfig::client());
		let frames = sink.frames();
		let mut wire = &[0x81u8, 0x01, b'a', 0x81, 0x01, b'b', 0x89, 0x00][..];
		sink.parse(&mut wire).unwrap();

		assert_eq!(frames.len(), 3);
		assert_eq!(frames.poll(WAIT), Some(Frame::text("a")));
		assert_eq!(frames.poll(WAIT), Some(Frame::text("b")));
		assert_eq!(frames.try_poll().map(|f| f.is_control()), Some(true));
		assert!(frames.is_empty());
	}

	#[test]
	fn poll_times_out_when_nothing_arrives() {
		let sink = FrameSink::new(ParserConfig::client());
		let frames = sink.frames();
		let started = Instant::now();
		assert_eq!(frames.poll(Duration::from_millis(20)), None);
		assert!(started.elapsed() >= Duration::from_millis(20));
		assert_eq!(frames.try_poll(), None);
	}

	#[test]
	fn poll_accepts_an_unrepresentable_timeout() {
		let mut sink = FrameSink::new(ParserConfig::client());
		let frames = sink.frames();
		sink.parse(&mut &[0x81u8, 0x01, b'a'][..]).unwrap();
		assert_eq!(frames.poll(Duration::from_secs(u64::MAX)), Some(Frame::text("a")));
		assert!(frames.is_empty());
	}

	#[test]
	fn unbounded_wait_ends_when_a_frame_arrives() {
		let mut sink = FrameSink::new(ParserConfig::client());
		let frames = sink.frames();
		let consumer = thread::spawn(move || frames.poll(Duration::from_secs(u64::MAX)));
		thread::sleep(Duration::from_millis(20));
		sink.parse(&mut &[0x82u8, 0x01, 7][..]).unwrap();
		assert_eq!(consumer.join().unwrap(), Some(Frame::binary(vec![7u8])));
	}

	#[test]
	fn unbounded_wait_ends_when_the_sink_closes() {
		let sink = FrameSink::new(ParserConfig::client());
		let frames = sink.frames();
		let consumer = thread::spawn(move || frames.poll(Duration::from_secs(u64::MAX)));
		thread::sleep(Duration::from_millis(20));
		drop(sink);
		assert_eq!(consumer.join().unwrap(), None);
	}

	#[test]
	fn partial_frames_wait_for_more_input() {
		let mut sink = FrameSink::new(ParserConfig::client());
		let frames = sink.frames();
		sink.parse(&mut &[0x82u8, 0x03, 1][..]).unwrap();
		assert_eq!(frames.try_poll(), None);
		assert!(sink.parser().is_mid_frame());
		sink.parse(&mut &[2u8, 3][..]).unwrap();
		assert_eq!(frames.poll(WAIT), Some(Frame::binary(vec![1u8, 2, 3])));
	}

	#[test]
	fn dropping_the_sink_closes_the_queue() {
		let mut sink = FrameSink::new(ParserConfig::client());
		let frames = sink.frames();
		sink.parse(&mut &[0x81u8, 0x01, b'z'][..]).unwrap();
		drop(sink);

		assert!(frames.is_closed());
		assert_eq!(frames.poll(WAIT), Some(Frame::text("z")));
		let started = Instant::now();
		assert_eq!(frames.poll(Duration::from_secs(5)), None);
		assert!(started.elapsed() < Duration::from_secs(5));
	}

	#[test]
	fn protocol_errors_reach_the_caller() {
		let mut sink = FrameSink::new(ParserConfig::server());
		let err = sink.parse(&mut &[0x81u8, 0x01, b'a'][..]).unwrap_err();
		assert!(err.is_protocol_error());
		assert!(sink.parser().is_failed());
		assert!(sink.frames().is_empty());
	}

	#[test]
	fn bounded_queue_blocks_producer_until_drained() {
		let mut sink = FrameSink::bounded(ParserConfig::client(), 2);
		let frames = sink.frames();

		let consumer = thread::spawn(move || {
			let mut seen = Vec::new();
			while seen.len() < 50 {
				match frames.poll(Duration::from_secs(5)) {
					Some(frame) => seen.push(frame.payload[0]),
					None => break,
				}
			}
			seen
		});

		let mut wire = Vec::new();
		for i in 0..50u8 {
			wire.extend_from_slice(&[0x82, 0x01, i]);
		}
		sink.parse(&mut &wire[..]).unwrap();

		let seen = consumer.join().unwrap();
		assert_eq!(seen, (0..50u8).collect::<Vec<_>>());
	}
}
