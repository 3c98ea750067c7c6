//! Frame channel over a persistent byte stream.
//!
//! `FrameChannel` turns any `Read` (normally the accepted producer
//! `TcpStream`) into a lazy sequence of `WireFrame`s. Reads may return any
//! number of bytes; the channel accumulates until a full header and then a
//! full payload are buffered.
//!
//! Termination:
//! - a zero-byte read ends the sequence with `Ok(None)`, including when it
//!   happens in the middle of a header or payload
//! - a malformed header fails the channel with `ChannelError::Framing`
//! - transport failures surface as `ChannelError::Io`
//!
//! After either outcome the channel is spent and yields nothing further.

use std::fmt;
use std::io::{ErrorKind, Read};

use super::wire::{FrameHeader, WireFrame, DEFAULT_MAX_FRAME_BYTES, HEADER_LEN};

const READ_CHUNK: usize = 8192;

#[derive(Debug)]
pub enum ChannelError {
    /// Header was nonsensical; the stream can no longer be trusted.
    Framing(String),
    /// Underlying transport failed.
    Io(std::io::Error),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Framing(msg) => write!(f, "framing error: {}", msg),
            ChannelError::Io(err) => write!(f, "frame channel i/o error: {}", err),
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChannelError::Io(err) => Some(err),
            ChannelError::Framing(_) => None,
        }
    }
}

impl From<std::io::Error> for ChannelError {
    fn from(err: std::io::Error) -> Self {
        ChannelError::Io(err)
    }
}

/// Counters for a single channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub frames_read: u64,
    pub bytes_read: u64,
}

pub struct FrameChannel<R> {
    reader: R,
    buffer: Vec<u8>,
    chunk: Vec<u8>,
    max_payload: u32,
    stats: ChannelStats,
    spent: bool,
}

impl<R: Read> FrameChannel<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
            chunk: vec![0u8; READ_CHUNK],
            max_payload: DEFAULT_MAX_FRAME_BYTES,
            stats: ChannelStats::default(),
            spent: false,
        }
    }

    /// Override the largest payload length accepted in a header.
    pub fn with_max_payload(mut self, max_payload: u32) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// Bytes received but not yet consumed by a complete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection.
    pub fn next_frame(&mut self) -> Result<Option<WireFrame>, ChannelError> {
        if self.spent {
            return Ok(None);
        }
        match self.read_frame() {
            Ok(Some(frame)) => Ok(Some(frame)),
            other => {
                self.spent = true;
                other
            }
        }
    }

    fn read_frame(&mut self) -> Result<Option<WireFrame>, ChannelError> {
        if !self.fill(HEADER_LEN)? {
            return Ok(None);
        }
        let mut raw = [0u8; HEADER_LEN];
        raw.copy_from_slice(&self.buffer[..HEADER_LEN]);
        let header = FrameHeader::parse(&raw, self.max_payload)?;
        self.buffer.drain(..HEADER_LEN);

        let len = header.payload_len as usize;
        if !self.fill(len)? {
            return Ok(None);
        }
        let rest = self.buffer.split_off(len);
        let payload = std::mem::replace(&mut self.buffer, rest);

        self.stats.frames_read += 1;
        Ok(Some(WireFrame {
            capture_time: header.capture_time,
            payload,
        }))
    }

    /// Read until at least `needed` bytes are buffered. `false` means EOF.
    fn fill(&mut self, needed: usize) -> Result<bool, ChannelError> {
        if self.buffer.capacity() < needed {
            self.buffer.reserve(needed - self.buffer.len());
        }
        while self.buffer.len() < needed {
            let read = match self.reader.read(&mut self.chunk) {
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            if read == 0 {
                if !self.buffer.is_empty() {
                    log::debug!(
                        "frame channel closed with {} of {} bytes buffered",
                        self.buffer.len(),
                        needed
                    );
                }
                return Ok(false);
            }
            self.stats.bytes_read += read as u64;
            self.buffer.extend_from_slice(&self.chunk[..read]);
        }
        Ok(true)
    }
}

impl<R: Read> Iterator for FrameChannel<R> {
    type Item = Result<WireFrame, ChannelError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::wire::encode_frame;
    use std::io::Cursor;

    /// Delivers at most `step` bytes per read.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let remaining = self.data.len() - self.pos;
            let n = remaining.min(self.step).min(buf.len());
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn stream_of(frames: &[(f64, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (ts, payload) in frames {
            out.extend(encode_frame(*ts, payload).unwrap());
        }
        out
    }

    #[test]
    fn round_trips_timestamp_and_payload() {
        let ts = 1_712_345_678.123_456;
        let bytes = stream_of(&[(ts, b"\xff\xd8jpeg\xff\xd9")]);
        let mut channel = FrameChannel::new(Cursor::new(bytes));

        let frame = channel.next_frame().unwrap().expect("frame");
        assert_eq!(frame.capture_time, ts);
        assert_eq!(frame.payload, b"\xff\xd8jpeg\xff\xd9");
        assert!(channel.next_frame().unwrap().is_none());
    }

    #[test]
    fn reassembles_frames_from_single_byte_reads() {
        let bytes = stream_of(&[(1.0, b"first"), (2.0, b""), (3.0, b"third frame")]);
        let channel = FrameChannel::new(Trickle {
            data: bytes,
            pos: 0,
            step: 1,
        });

        let frames: Vec<WireFrame> = channel.map(|f| f.unwrap()).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].payload, b"first");
        assert!(frames[1].payload.is_empty());
        assert_eq!(frames[2].capture_time, 3.0);
        assert_eq!(frames[2].payload, b"third frame");
    }

    #[test]
    fn eof_inside_header_is_connection_closed() {
        let mut bytes = stream_of(&[(1.0, b"ok")]);
        bytes.extend_from_slice(&[0u8; 5]);
        let mut channel = FrameChannel::new(Cursor::new(bytes));

        assert!(channel.next_frame().unwrap().is_some());
        assert!(channel.next_frame().unwrap().is_none());
        assert!(channel.next_frame().unwrap().is_none());
    }

    #[test]
    fn eof_inside_payload_is_connection_closed() {
        let mut bytes = stream_of(&[(1.0, b"complete payload")]);
        bytes.truncate(bytes.len() - 4);
        let mut channel = FrameChannel::new(Trickle {
            data: bytes,
            pos: 0,
            step: 3,
        });

        assert!(channel.next_frame().unwrap().is_none());
        assert_eq!(channel.stats().frames_read, 0);
    }

    #[test]
    fn oversized_length_fails_the_channel() {
        let mut bytes = stream_of(&[(1.0, b"fine")]);
        let bogus = crate::ingest::wire::FrameHeader {
            capture_time: 2.0,
            payload_len: u32::MAX,
        };
        bytes.extend_from_slice(&bogus.to_bytes());
        bytes.extend_from_slice(b"trailing");

        let mut channel = FrameChannel::new(Cursor::new(bytes)).with_max_payload(1024);
        assert!(channel.next_frame().unwrap().is_some());
        let err = channel.next_frame().unwrap_err();
        assert!(matches!(err, ChannelError::Framing(_)));
        assert!(channel.next_frame().unwrap().is_none());
    }

    #[test]
    fn iterator_stops_after_framing_error() {
        let bogus = crate::ingest::wire::FrameHeader {
            capture_time: 2.0,
            payload_len: 4096,
        };
        let channel = FrameChannel::new(Cursor::new(bogus.to_bytes().to_vec())).with_max_payload(16);
        let items: Vec<_> = channel.collect();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}
