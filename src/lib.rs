#![warn(missing_docs)]
#![deny(unused_mut)]

//! websocket-framing is the RFC6455 framing layer of a WebSocket stack,
//! with no handshake and no I/O attached.
//!
//! # Generating
//! `codec::Generator` writes a `Frame` into any `bytes::BufMut` with room for
//! it. Header and payload can be written separately or together; a buffer
//! that is too small is reported instead of grown.
//!
//! # Parsing
//! `codec::Parser` turns bytes back into frames. It is resumable: hand it
//! whatever has arrived and it keeps partial frames between calls, whether
//! the split falls inside the header, the masking key or the payload. A
//! `Behavior` tells it which side of the connection it sits on, and so
//! whether incoming frames must be masked.
//!
//! # Consuming
//! `capture::FrameSink` wraps a parser and queues decoded frames for
//! consumers that `poll` with a timeout, on the same thread or others.
//!
//! ```
//! use websocket_framing::capture::FrameSink;
//! use websocket_framing::codec::{Generator, ParserConfig};
//! use websocket_framing::Frame;
//! use std::time::Duration;
//!
//! let frame = Frame::text("hello").with_mask([0x37, 0xfa, 0x21, 0x3d]);
//! let mut wire = Vec::new();
//! Generator::new().generate_whole_frame(&frame, &mut wire).unwrap();
//!
//! let mut sink = FrameSink::new(ParserConfig::server());
//! sink.parse(&mut &wire[..]).unwrap();
//! assert_eq!(sink.frames().poll(Duration::from_secs(1)), Some(frame));
//! ```
#[macro_use]
extern crate bitflags;

pub mod capture;
pub mod codec;
pub mod dataframe;
pub mod pool;
pub mod result;
pub mod util;

pub use crate::codec::{Behavior, Generator, Parser, ParserConfig};
pub use crate::dataframe::{Frame, Opcode};
pub use crate::result::{WebSocketError, WebSocketResult};
