/// Pixel coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box in pixel coordinates, `(x1, y1)` top-left and
/// `(x2, y2)` bottom-right.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Integer midpoint of the box.
    pub fn center(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2, (self.y1 + self.y2) / 2)
    }

    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let inter = BBox::new(
            self.x1.max(other.x1),
            self.y1.max(other.y1),
            self.x2.min(other.x2),
            self.y2.min(other.y2),
        )
        .area();
        let union = self.area() + other.area() - inter;
        if union <= 0 {
            0.0
        } else {
            inter as f32 / union as f32
        }
    }
}

/// COCO class ids treated as vehicles: car, motorcycle, bus, truck.
pub const VEHICLE_CLASSES: &[u32] = &[2, 3, 5, 7];

/// A single object candidate produced by a detector for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BBox,
    /// Detector class id (COCO numbering for the bundled backends).
    pub class_id: u32,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BBox, class_id: u32, confidence: f32) -> Self {
        Self {
            bbox,
            class_id,
            confidence,
        }
    }

    pub fn center(&self) -> Point {
        self.bbox.center()
    }
}

/// Keeps only detections of interesting classes above a confidence floor.
#[derive(Clone, Debug)]
pub struct ClassFilter {
    classes: Vec<u32>,
    min_confidence: f32,
}

impl ClassFilter {
    /// An empty class list admits every class.
    pub fn new(classes: Vec<u32>, min_confidence: f32) -> Self {
        Self {
            classes,
            min_confidence,
        }
    }

    pub fn admits(&self, det: &Detection) -> bool {
        det.confidence >= self.min_confidence
            && (self.classes.is_empty() || self.classes.contains(&det.class_id))
    }

    pub fn retain(&self, detections: &mut Vec<Detection>) {
        detections.retain(|det| self.admits(det));
    }
}

impl Default for ClassFilter {
    fn default() -> Self {
        Self::new(VEHICLE_CLASSES.to_vec(), 0.25)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_uses_integer_midpoint() {
        assert_eq!(BBox::new(10, 20, 15, 31).center(), Point::new(12, 25));
    }

    #[test]
    fn iou_of_disjoint_and_identical_boxes() {
        let a = BBox::new(0, 0, 10, 10);
        assert_eq!(a.iou(&BBox::new(20, 20, 30, 30)), 0.0);
        assert_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn class_filter_drops_people_and_weak_scores() {
        let filter = ClassFilter::default();
        let mut dets = vec![
            Detection::new(BBox::new(0, 0, 10, 10), 2, 0.9),
            Detection::new(BBox::new(0, 0, 10, 10), 0, 0.9),
            Detection::new(BBox::new(0, 0, 10, 10), 7, 0.1),
        ];
        filter.retain(&mut dets);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 2);
    }
}
