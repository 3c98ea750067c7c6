//! Decoded frames.
//!
//! A `RawFrame` lives for exactly one processing cycle: it is decoded from a
//! `WireFrame`, handed to the detector, cropped for attribute sampling when a
//! track arms, and dropped.

use anyhow::{Context, Result};
use image::RgbImage;

use crate::detect::{BBox, Detection, DetectorBackend};
use crate::ingest::WireFrame;

// ----------------------------------------------------------------------------
// RawFrame
// ----------------------------------------------------------------------------

pub struct RawFrame {
    image: RgbImage,
    /// Producer-supplied capture time, seconds since the epoch.
    pub capture_time: f64,
}

impl RawFrame {
    /// Decode the opaque payload of a wire frame (JPEG or PNG).
    pub fn decode(frame: &WireFrame) -> Result<Self> {
        let image = image::load_from_memory(&frame.payload)
            .with_context(|| format!("undecodable {} byte payload", frame.payload.len()))?
            .into_rgb8();
        Ok(Self {
            image,
            capture_time: frame.capture_time,
        })
    }

    pub fn from_rgb(image: RgbImage, capture_time: f64) -> Self {
        Self {
            image,
            capture_time,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn run_detector(&self, detector: &mut dyn DetectorBackend) -> Result<Vec<Detection>> {
        detector.detect(self.image.as_raw(), self.width(), self.height())
    }

    /// Copy of the region under `bbox`, clamped to the frame. A box that lies
    /// outside the frame yields an empty image.
    pub fn crop(&self, bbox: &BBox) -> RgbImage {
        let (w, h) = (self.width() as i64, self.height() as i64);
        let x1 = (bbox.x1 as i64).clamp(0, w);
        let y1 = (bbox.y1 as i64).clamp(0, h);
        let x2 = (bbox.x2 as i64).clamp(0, w);
        let y2 = (bbox.y2 as i64).clamp(0, h);
        if x2 <= x1 || y2 <= y1 {
            return RgbImage::new(0, 0);
        }
        image::imageops::crop_imm(
            &self.image,
            x1 as u32,
            y1 as u32,
            (x2 - x1) as u32,
            (y2 - y1) as u32,
        )
        .to_image()
    }
}
