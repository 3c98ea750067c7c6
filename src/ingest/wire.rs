//! Frame wire format.
//!
//! Every frame on the producer connection is a fixed 12-byte header followed
//! by an opaque payload:
//!
//! ```text
//! offset 0..8      f64 capture timestamp, seconds since epoch (little-endian)
//! offset 8..12     u32 payload length N (little-endian)
//! offset 12..12+N  payload bytes (e.g. an encoded JPEG still)
//! ```
//!
//! Frames are concatenated with no other delimiter.

use super::channel::ChannelError;

/// Size of the fixed frame header in bytes.
pub const HEADER_LEN: usize = 12;

/// Default ceiling on a single payload. Anything larger is treated as a
/// corrupt header rather than an allocation request.
pub const DEFAULT_MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

/// A frame as it arrived on the wire. The payload codec is not validated here.
#[derive(Clone, Debug, PartialEq)]
pub struct WireFrame {
    pub capture_time: f64,
    pub payload: Vec<u8>,
}

/// Decoded frame header.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameHeader {
    pub capture_time: f64,
    pub payload_len: u32,
}

impl FrameHeader {
    /// Parse and sanity-check a header.
    pub fn parse(bytes: &[u8; HEADER_LEN], max_payload: u32) -> Result<Self, ChannelError> {
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&bytes[0..8]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&bytes[8..12]);

        let capture_time = f64::from_le_bytes(ts);
        let payload_len = u32::from_le_bytes(len);

        if !capture_time.is_finite() || capture_time < 0.0 {
            return Err(ChannelError::Framing(format!(
                "invalid capture timestamp {}",
                capture_time
            )));
        }
        if payload_len > max_payload {
            return Err(ChannelError::Framing(format!(
                "payload length {} exceeds limit {}",
                payload_len, max_payload
            )));
        }
        Ok(Self {
            capture_time,
            payload_len,
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..8].copy_from_slice(&self.capture_time.to_le_bytes());
        out[8..12].copy_from_slice(&self.payload_len.to_le_bytes());
        out
    }
}

/// Encode one frame (header + payload) for transmission.
pub fn encode_frame(capture_time: f64, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
    let payload_len = u32::try_from(payload.len())
        .map_err(|_| anyhow::anyhow!("payload of {} bytes exceeds u32 range", payload.len()))?;
    let header = FrameHeader {
        capture_time,
        payload_len,
    };
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}
