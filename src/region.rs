//! Measurement boundaries and the region-of-interest filter.
//!
//! Two parallel reference lines are fixed per run. With `Vertical`
//! boundaries the lines sit at two x positions and objects are measured on
//! their x coordinate; with `Horizontal` boundaries the lines sit at two y
//! positions and the y coordinate is used.

use serde::Deserialize;

use crate::detect::{Detection, Point};

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryOrientation {
    Horizontal,
    #[default]
    Vertical,
}

impl BoundaryOrientation {
    /// The coordinate that moves across the boundaries.
    pub fn coordinate(self, point: Point) -> i32 {
        match self {
            BoundaryOrientation::Horizontal => point.y,
            BoundaryOrientation::Vertical => point.x,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "horizontal" => Some(BoundaryOrientation::Horizontal),
            "vertical" => Some(BoundaryOrientation::Vertical),
            _ => None,
        }
    }
}

/// The pair of reference lines. `first` arms a track, `second` finalizes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Boundaries {
    pub orientation: BoundaryOrientation,
    pub first: i32,
    pub second: i32,
}

impl Boundaries {
    pub fn coordinate(&self, point: Point) -> i32 {
        self.orientation.coordinate(point)
    }
}

/// Admits detections whose relevant coordinate lies within
/// `[min(first, second) - margin, max(first, second) + margin]`.
#[derive(Clone, Copy, Debug)]
pub struct RegionFilter {
    orientation: BoundaryOrientation,
    low: i32,
    high: i32,
}

impl RegionFilter {
    pub fn new(boundaries: &Boundaries, margin: i32) -> Self {
        Self {
            orientation: boundaries.orientation,
            low: boundaries.first.min(boundaries.second) - margin,
            high: boundaries.first.max(boundaries.second) + margin,
        }
    }

    pub fn contains(&self, coord: i32) -> bool {
        (self.low..=self.high).contains(&coord)
    }

    pub fn admits(&self, det: &Detection) -> bool {
        self.contains(self.orientation.coordinate(det.center()))
    }

    pub fn retain(&self, detections: &mut Vec<Detection>) {
        detections.retain(|det| self.admits(det));
    }
}
