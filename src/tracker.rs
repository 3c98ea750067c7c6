//! Greedy nearest-position tracker.
//!
//! Each detection is matched to the first live track (ascending id) whose
//! centre lies strictly within `tolerance` on both axes. Unmatched detections
//! open new tracks; tracks that receive no detection in a frame are dropped
//! immediately.
//!
//! Known limitation: this is first-match assignment, not an optimal one. Two
//! vehicles close together can swap identities, and a single missed frame
//! ends a track. Measurement accuracy downstream assumes this behaviour.

use std::collections::{BTreeMap, BTreeSet};

use crate::crossing::CrossingState;
use crate::detect::{BBox, Detection, Point};

#[derive(Clone, Debug)]
pub struct Track {
    pub id: u64,
    pub center: Point,
    pub bbox: BBox,
    pub crossing: CrossingState,
}

/// Position change applied to one track during [`Tracker::update`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackUpdate {
    pub id: u64,
    pub previous: Point,
    pub current: Point,
    /// Box of the detection that produced this update.
    pub bbox: BBox,
    /// The track was opened by this detection; `previous == current`.
    pub created: bool,
}

#[derive(Debug)]
pub struct Tracker {
    tracks: BTreeMap<u64, Track>,
    next_id: u64,
    tolerance: i32,
}

impl Tracker {
    pub fn new(tolerance: i32) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_id: 0,
            tolerance,
        }
    }

    /// Apply one frame of detections. Returns one update per detection, in
    /// detection order.
    pub fn update(&mut self, detections: &[Detection]) -> Vec<TrackUpdate> {
        let tolerance = self.tolerance;
        let mut touched = BTreeSet::new();
        let mut updates = Vec::with_capacity(detections.len());

        for det in detections {
            let center = det.center();
            let matched = self
                .tracks
                .values_mut()
                .find(|track| within(track.center, center, tolerance));

            let update = match matched {
                Some(track) => {
                    let previous = track.center;
                    track.center = center;
                    track.bbox = det.bbox;
                    TrackUpdate {
                        id: track.id,
                        previous,
                        current: center,
                        bbox: det.bbox,
                        created: false,
                    }
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.tracks.insert(
                        id,
                        Track {
                            id,
                            center,
                            bbox: det.bbox,
                            crossing: CrossingState::Unarmed,
                        },
                    );
                    TrackUpdate {
                        id,
                        previous: center,
                        current: center,
                        bbox: det.bbox,
                        created: true,
                    }
                }
            };
            touched.insert(update.id);
            updates.push(update);
        }

        let before = self.tracks.len();
        self.tracks.retain(|id, _| touched.contains(id));
        let dropped = before - self.tracks.len();
        if dropped > 0 {
            log::debug!("tracker: dropped {} unmatched track(s)", dropped);
        }
        updates
    }

    pub fn track(&self, id: u64) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn track_mut(&mut self, id: u64) -> Option<&mut Track> {
        self.tracks.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Identity the next new track will receive.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }
}

fn within(a: Point, b: Point, tolerance: i32) -> bool {
    (a.x - b.x).abs() < tolerance && (a.y - b.y).abs() < tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: i32, y: i32) -> Detection {
        Detection::new(BBox::new(x - 10, y - 10, x + 10, y + 10), 2, 0.9)
    }

    #[test]
    fn smooth_motion_keeps_identity() {
        let mut tracker = Tracker::new(100);
        let first = tracker.update(&[at(200, 300)]);
        let second = tracker.update(&[at(240, 300)]);

        assert_eq!(first[0].id, second[0].id);
        assert!(first[0].created);
        assert!(!second[0].created);
        assert_eq!(second[0].previous, Point::new(200, 300));
        assert_eq!(second[0].current, Point::new(240, 300));
    }

    #[test]
    fn distant_detection_opens_a_fresh_track() {
        let mut tracker = Tracker::new(100);
        let a = tracker.update(&[at(200, 300)])[0].id;
        let b = tracker.update(&[at(500, 300)])[0].id;
        assert_ne!(a, b);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.track(a).is_none());
    }

    #[test]
    fn tolerance_is_strict_on_each_axis() {
        let mut tracker = Tracker::new(100);
        let a = tracker.update(&[at(0, 0)])[0].id;
        let b = tracker.update(&[at(99, 99)])[0].id;
        assert_eq!(a, b);
        let c = tracker.update(&[at(199, 99)])[0].id;
        assert_ne!(b, c);
    }

    #[test]
    fn unmatched_tracks_are_dropped_after_the_frame() {
        let mut tracker = Tracker::new(50);
        tracker.update(&[at(100, 100), at(400, 100)]);
        assert_eq!(tracker.len(), 2);
        tracker.update(&[at(110, 100)]);
        assert_eq!(tracker.len(), 1);
        tracker.update(&[]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn identities_are_never_reused() {
        let mut tracker = Tracker::new(50);
        let a = tracker.update(&[at(100, 100)])[0].id;
        tracker.update(&[]);
        let b = tracker.update(&[at(100, 100)])[0].id;
        assert!(b > a);
        assert_eq!(tracker.next_id(), b + 1);
    }

    #[test]
    fn first_track_in_id_order_wins_a_tie() {
        let mut tracker = Tracker::new(100);
        let ids: Vec<u64> = tracker
            .update(&[at(100, 100), at(250, 100)])
            .iter()
            .map(|u| u.id)
            .collect();
        let next = tracker.update(&[at(175, 100)]);
        assert_eq!(next[0].id, ids[0]);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn later_detection_can_match_track_created_this_frame() {
        let mut tracker = Tracker::new(100);
        let updates = tracker.update(&[at(100, 100), at(120, 100)]);
        assert_eq!(updates[0].id, updates[1].id);
        assert!(!updates[1].created);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn each_update_carries_its_own_detection_box() {
        let mut tracker = Tracker::new(100);
        let updates = tracker.update(&[at(100, 100), at(120, 100)]);
        assert_eq!(updates[0].bbox, BBox::new(90, 90, 110, 110));
        assert_eq!(updates[1].bbox, BBox::new(110, 90, 130, 110));
        assert_eq!(tracker.track(updates[0].id).unwrap().bbox, updates[1].bbox);
    }
}
