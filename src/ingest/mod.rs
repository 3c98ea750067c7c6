//! Frame ingestion.
//!
//! The receiver ingests frames from exactly one producer connection at a time.
//! This module provides:
//! - `wire`: the 12-byte header + payload framing used by producers
//! - `channel`: `FrameChannel`, which decodes a byte stream into `WireFrame`s
//! - `reader`: `FrameReader`, which runs a channel on its own thread
//!
//! The ingestion layer does not interpret payloads. Decoding the still image
//! happens downstream in `frame::RawFrame::decode`, where an undecodable
//! payload is dropped without closing the connection.

pub mod channel;
pub mod reader;
pub mod wire;

pub use channel::{ChannelError, ChannelStats, FrameChannel};
pub use reader::FrameReader;
pub use wire::{encode_frame, FrameHeader, WireFrame, DEFAULT_MAX_FRAME_BYTES, HEADER_LEN};
