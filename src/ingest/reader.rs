//! Background frame reader.
//!
//! Socket reads run on their own thread and hand complete frames to the
//! processing side over a bounded queue. Frames stay in arrival order; the
//! queue bound provides back-pressure onto the producer instead of buffering
//! an unbounded backlog while detection is slow.

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver};
use std::io::Read;
use std::thread::JoinHandle;

use super::channel::{ChannelError, ChannelStats, FrameChannel};
use super::wire::WireFrame;

pub struct FrameReader {
    rx: Option<Receiver<Result<WireFrame, ChannelError>>>,
    join: Option<JoinHandle<ChannelStats>>,
}

impl FrameReader {
    /// Start reading `source` on a dedicated thread.
    pub fn spawn<R>(source: R, max_payload: u32, queue_depth: usize) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = bounded(queue_depth.max(1));
        let join = std::thread::Builder::new()
            .name("frame-reader".to_string())
            .spawn(move || {
                let mut channel = FrameChannel::new(source).with_max_payload(max_payload);
                loop {
                    match channel.next_frame() {
                        Ok(Some(frame)) => {
                            if tx.send(Ok(frame)).is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            let _ = tx.send(Err(err));
                            break;
                        }
                    }
                }
                channel.stats()
            })?;
        Ok(Self {
            rx: Some(rx),
            join: Some(join),
        })
    }

    /// Stop consuming and wait for the reader thread.
    ///
    /// The thread only exits once its blocking read returns, so callers that
    /// stop early must close the underlying stream first.
    pub fn finish(mut self) -> Result<ChannelStats> {
        self.rx.take();
        match self.join.take() {
            Some(join) => join
                .join()
                .map_err(|_| anyhow!("frame reader thread panicked")),
            None => Ok(ChannelStats::default()),
        }
    }
}

impl Iterator for FrameReader {
    type Item = Result<WireFrame, ChannelError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.as_ref()?.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::wire::encode_frame;
    use std::io::Cursor;

    #[test]
    fn delivers_frames_in_order_then_stops() {
        let mut bytes = Vec::new();
        for i in 0..20 {
            bytes.extend(encode_frame(i as f64, &[i as u8; 3]).unwrap());
        }
        let mut reader = FrameReader::spawn(Cursor::new(bytes), 1024, 2).unwrap();

        let times: Vec<f64> = reader
            .by_ref()
            .map(|f| f.unwrap().capture_time)
            .collect();
        assert_eq!(times, (0..20).map(|i| i as f64).collect::<Vec<_>>());

        let stats = reader.finish().unwrap();
        assert_eq!(stats.frames_read, 20);
    }

    #[test]
    fn forwards_framing_error_as_last_item() {
        let mut bytes = encode_frame(1.0, b"a").unwrap();
        bytes.extend(encode_frame(2.0, &[0u8; 64]).unwrap());
        let reader = FrameReader::spawn(Cursor::new(bytes), 8, 1).unwrap();

        let items: Vec<_> = reader.collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(ChannelError::Framing(_))));
    }
}
