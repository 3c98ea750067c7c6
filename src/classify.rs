//! Attribute classifiers applied once per track at arming.

use anyhow::Result;
use image::RgbImage;

/// Label used when a region cannot be classified.
pub const UNKNOWN_ATTRIBUTE: &str = "Unknown";

/// Labels a cropped image region. Called at most once per track.
pub trait AttributeClassifier: Send {
    fn classify(&self, region: &RgbImage) -> Result<String>;
}

/// Names the dominant colour of a region from its mean pixel.
///
/// The mean is converted to 8-bit HSV (hue in `0..180`). Low-saturation
/// means are Black, White or Gray by brightness; everything else is bucketed
/// by hue.
#[derive(Clone, Copy, Debug, Default)]
pub struct DominantColorClassifier;

impl DominantColorClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl AttributeClassifier for DominantColorClassifier {
    fn classify(&self, region: &RgbImage) -> Result<String> {
        let Some(mean) = mean_rgb(region) else {
            return Ok(UNKNOWN_ATTRIBUTE.to_string());
        };
        let (h, s, v) = rgb_to_hsv(mean);
        Ok(color_name(h, s, v).to_string())
    }
}

fn mean_rgb(region: &RgbImage) -> Option<[u8; 3]> {
    let count = region.width() as u64 * region.height() as u64;
    if count == 0 {
        return None;
    }
    let mut sum = [0u64; 3];
    for pixel in region.pixels() {
        for (acc, &c) in sum.iter_mut().zip(pixel.0.iter()) {
            *acc += c as u64;
        }
    }
    Some(sum.map(|s| (s / count) as u8))
}

/// 8-bit HSV: `h` in `0..180`, `s` and `v` in `0..=255`.
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> (u8, u8, u8) {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let v = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let diff = v - min;
    let s = if v > 0.0 { diff * 255.0 / v } else { 0.0 };
    let mut h = if diff == 0.0 {
        0.0
    } else if v == rf {
        60.0 * (gf - bf) / diff
    } else if v == gf {
        120.0 + 60.0 * (bf - rf) / diff
    } else {
        240.0 + 60.0 * (rf - gf) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }
    let h = ((h / 2.0).round() as u32 % 180) as u8;
    (h, s.round().min(255.0) as u8, v as u8)
}

pub fn color_name(h: u8, s: u8, v: u8) -> &'static str {
    if s < 50 {
        return if v < 50 {
            "Black"
        } else if v > 100 {
            "White"
        } else {
            "Gray"
        };
    }
    match h {
        0..=9 | 170.. => "Red",
        10..=24 => "Orange",
        25..=34 => "Yellow",
        35..=84 => "Green",
        85..=129 => "Blue",
        _ => "Purple",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(8, 8, Rgb(rgb))
    }

    fn classify(rgb: [u8; 3]) -> String {
        DominantColorClassifier.classify(&solid(rgb)).unwrap()
    }

    #[test]
    fn primary_colours() {
        assert_eq!(classify([200, 20, 20]), "Red");
        assert_eq!(classify([20, 200, 20]), "Green");
        assert_eq!(classify([20, 20, 200]), "Blue");
        assert_eq!(classify([230, 220, 30]), "Yellow");
        assert_eq!(classify([240, 120, 10]), "Orange");
        assert_eq!(classify([140, 30, 200]), "Purple");
    }

    #[test]
    fn greys_by_brightness() {
        assert_eq!(classify([10, 10, 10]), "Black");
        assert_eq!(classify([80, 80, 80]), "Gray");
        assert_eq!(classify([220, 220, 220]), "White");
    }

    #[test]
    fn empty_region_is_unknown() {
        let empty = RgbImage::new(0, 0);
        assert_eq!(
            DominantColorClassifier.classify(&empty).unwrap(),
            UNKNOWN_ATTRIBUTE
        );
    }

    #[test]
    fn hsv_matches_8bit_convention() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), (0, 255, 255));
        assert_eq!(rgb_to_hsv([0, 255, 0]), (60, 255, 255));
        assert_eq!(rgb_to_hsv([0, 0, 255]), (120, 255, 255));
        assert_eq!(rgb_to_hsv([0, 0, 0]), (0, 0, 0));
    }

    #[test]
    fn mean_is_truncated() {
        let mut img = RgbImage::from_pixel(2, 1, Rgb([0, 0, 0]));
        img.put_pixel(1, 0, Rgb([3, 3, 3]));
        assert_eq!(mean_rgb(&img), Some([1, 1, 1]));
    }
}
