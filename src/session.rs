//! Connection-scoped measurement session.
//!
//! A `Session` owns all per-connection measurement state (the tracker and
//! every track's crossing state) and is dropped when the producer
//! disconnects, so identities restart from zero on the next connection.
//! Frames are applied strictly one at a time, in arrival order.

use std::time::{Duration, Instant};

use anyhow::Result;

use crate::classify::{AttributeClassifier, UNKNOWN_ATTRIBUTE};
use crate::config::ReceiverConfig;
use crate::crossing::{CrossingEngine, Transition};
use crate::detect::{BBox, ClassFilter, Detection, DetectorBackend};
use crate::frame::RawFrame;
use crate::ingest::{ChannelError, WireFrame};
use crate::region::{Boundaries, RegionFilter};
use crate::sink::SinkHandle;
use crate::speed::{Measurement, SpeedCalculator};
use crate::tracker::Tracker;

const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub skipped_frames: u64,
    pub detections: u64,
    pub measurements: u64,
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The producer closed the stream. Expected.
    ConnectionClosed,
    /// Framing or I/O failure; the connection is abandoned.
    Failed(ChannelError),
}

pub struct Session<'a> {
    boundaries: Boundaries,
    region: RegionFilter,
    classes: ClassFilter,
    tracker: Tracker,
    crossing: CrossingEngine,
    speed: SpeedCalculator,
    detector: &'a mut dyn DetectorBackend,
    classifier: &'a dyn AttributeClassifier,
    stats: SessionStats,
}

impl<'a> Session<'a> {
    /// Fresh state for a new connection. Resets the detector as well.
    pub fn new(
        config: &ReceiverConfig,
        detector: &'a mut dyn DetectorBackend,
        classifier: &'a dyn AttributeClassifier,
    ) -> Result<Self> {
        let speed = SpeedCalculator::new(config.distance, config.speed_limit, config.unit)?;
        let crossing = CrossingEngine::new(config.boundaries.first, config.boundaries.second)
            .with_max_elapsed(config.max_elapsed_secs);
        detector.reset();
        Ok(Self {
            boundaries: config.boundaries,
            region: RegionFilter::new(&config.boundaries, config.margin),
            classes: ClassFilter::new(config.detector.classes.clone(), config.detector.confidence),
            tracker: Tracker::new(config.match_tolerance),
            crossing,
            speed,
            detector,
            classifier,
            stats: SessionStats::default(),
        })
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Decode, detect and measure one wire frame. Undecodable payloads are
    /// skipped without touching any track.
    pub fn process_frame(&mut self, frame: &WireFrame) -> Vec<Measurement> {
        let raw = match RawFrame::decode(frame) {
            Ok(raw) => raw,
            Err(e) => {
                self.stats.skipped_frames += 1;
                log::warn!("session: skipping frame at t={:.3}: {:#}", frame.capture_time, e);
                return Vec::new();
            }
        };
        let detections = match raw.run_detector(&mut *self.detector) {
            Ok(detections) => detections,
            Err(e) => {
                log::warn!(
                    "session: detector '{}' failed, treating frame as empty: {:#}",
                    self.detector.name(),
                    e
                );
                Vec::new()
            }
        };
        self.observe(&raw, detections)
    }

    /// Apply one frame's detections to the measurement state.
    pub fn observe(&mut self, frame: &RawFrame, mut detections: Vec<Detection>) -> Vec<Measurement> {
        self.stats.frames += 1;
        self.classes.retain(&mut detections);
        self.region.retain(&mut detections);
        self.stats.detections += detections.len() as u64;

        let crossing = self.crossing;
        let classifier = self.classifier;
        let mut measurements = Vec::new();

        for update in self.tracker.update(&detections) {
            let Some(track) = self.tracker.track_mut(update.id) else {
                continue;
            };
            let prev = self.boundaries.coordinate(update.previous);
            let curr = self.boundaries.coordinate(update.current);
            let bbox = update.bbox;

            let transition = crossing.advance(
                &mut track.crossing,
                prev,
                curr,
                frame.capture_time,
                || sample_attribute(classifier, frame, &bbox),
            );
            match transition {
                Transition::None => {}
                Transition::Armed => {
                    log::debug!("session: track {} armed at t={:.3}", update.id, frame.capture_time);
                }
                Transition::Rejected { elapsed } => {
                    log::warn!(
                        "session: track {} crossed second boundary with elapsed {:.3}s, discarded",
                        update.id,
                        elapsed
                    );
                }
                Transition::Finalized { attribute, elapsed } => {
                    let m = self
                        .speed
                        .measure(update.id, attribute, elapsed, frame.capture_time);
                    log::debug!(
                        "session: track {} finalized, {:.1} {} ({})",
                        m.track_id,
                        m.speed,
                        m.unit.label(),
                        m.verdict
                    );
                    measurements.push(m);
                }
            }
        }
        self.stats.measurements += measurements.len() as u64;
        measurements
    }

    /// Consume frames until the stream closes or fails, submitting every
    /// measurement to `sink`.
    pub fn run<I>(&mut self, frames: I, sink: &SinkHandle) -> SessionEnd
    where
        I: IntoIterator<Item = Result<WireFrame, ChannelError>>,
    {
        let mut last_stats = Instant::now();
        for item in frames {
            let frame = match item {
                Ok(frame) => frame,
                Err(e) => return SessionEnd::Failed(e),
            };
            for m in self.process_frame(&frame) {
                sink.submit(m);
            }
            if last_stats.elapsed() >= STATS_INTERVAL {
                let s = self.stats;
                log::info!(
                    "session: frames={} skipped={} detections={} measurements={} tracks={}",
                    s.frames,
                    s.skipped_frames,
                    s.detections,
                    s.measurements,
                    self.tracker.len()
                );
                last_stats = Instant::now();
            }
        }
        SessionEnd::ConnectionClosed
    }
}

fn sample_attribute(classifier: &dyn AttributeClassifier, frame: &RawFrame, bbox: &BBox) -> String {
    let region = frame.crop(bbox);
    match classifier.classify(&region) {
        Ok(label) => label,
        Err(e) => {
            log::warn!("session: attribute classifier failed: {:#}", e);
            UNKNOWN_ATTRIBUTE.to_string()
        }
    }
}
