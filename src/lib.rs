//! Speed Trap Kernel
//!
//! Receives timestamped still frames from a camera producer over a single
//! TCP connection, detects vehicles, tracks them across frames and measures
//! their speed as they cross two fixed reference lines a known distance
//! apart.
//!
//! # Pipeline
//!
//! ```text
//! FrameChannel -> detector -> ClassFilter/RegionFilter -> Tracker
//!     -> CrossingEngine -> SpeedCalculator -> ResultSink
//! ```
//!
//! Measurement state is owned by a connection-scoped [`Session`]; the
//! receiver runs one session per producer connection and starts a fresh one
//! when the producer reconnects. Sink writes happen on a worker thread behind a
//! bounded queue; a stalled sink holds up ingestion only briefly.
//!
//! # Module Structure
//!
//! - `ingest`: wire format, frame channel, background reader
//! - `detect`: detector backends and detection types
//! - `region`, `tracker`, `crossing`, `speed`: measurement core
//! - `classify`: attribute (dominant colour) sampling
//! - `sink`: log, status store, alerts, sink worker
//! - `session`, `server`: per-connection pipeline and accept loop

use anyhow::Result;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod classify;
pub mod config;
pub mod crossing;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod region;
pub mod server;
pub mod session;
pub mod sink;
pub mod speed;
pub mod tracker;

pub use classify::{AttributeClassifier, DominantColorClassifier, UNKNOWN_ATTRIBUTE};
pub use config::{DetectorSettings, ReceiverConfig, SinkSettings};
pub use crossing::{CrossingEngine, CrossingState, Transition};
pub use detect::{build_backend, BBox, ClassFilter, Detection, DetectorBackend, Point};
pub use frame::RawFrame;
pub use ingest::{encode_frame, ChannelError, FrameChannel, FrameReader, WireFrame};
pub use region::{BoundaryOrientation, Boundaries, RegionFilter};
pub use server::{ReceiverHandle, ReceiverServer};
pub use session::{Session, SessionEnd, SessionStats};
pub use sink::{ReceiverSink, ResultSink, SinkHandle, SinkWorker};
pub use speed::{Measurement, SpeedCalculator, SpeedUnit, Verdict};
pub use tracker::{Track, TrackUpdate, Tracker};

// -------------------- Time --------------------

/// Wall-clock seconds since the epoch with sub-second precision.
pub fn now_s() -> Result<f64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs_f64())
}
