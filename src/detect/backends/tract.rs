#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{imageops::FilterType, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BBox, Detection, VEHICLE_CLASSES};

const BOX_FIELDS: usize = 4;
const PAD_VALUE: f32 = 144.0 / 255.0;

/// Tract-based backend for YOLOv8-style ONNX detection models.
///
/// Expects a single output tensor shaped `[1, 4 + classes, anchors]` with
/// centre-format boxes in model-input pixels. Frames are scaled to fit the
/// model input (top-left anchored, grey padded) and boxes are mapped back.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    width: u32,
    height: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
    classes: Vec<u32>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            classes: VEHICLE_CLASSES.to_vec(),
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Restrict output to these class ids. Empty keeps every class.
    pub fn with_classes(mut self, classes: Vec<u32>) -> Self {
        self.classes = classes;
        self
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<(Tensor, f32)> {
        let frame = RgbImage::from_raw(width, height, pixels.to_vec())
            .ok_or_else(|| anyhow!("pixel buffer does not match {}x{} RGB", width, height))?;
        let ratio = (self.width as f32 / width as f32).min(self.height as f32 / height as f32);
        let scaled_w = ((width as f32 * ratio).round() as u32).clamp(1, self.width);
        let scaled_h = ((height as f32 * ratio).round() as u32).clamp(1, self.height);
        let scaled = image::imageops::resize(&frame, scaled_w, scaled_h, FilterType::Triangle);

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| {
                if (x as u32) < scaled_w && (y as u32) < scaled_h {
                    scaled.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0
                } else {
                    PAD_VALUE
                }
            },
        );
        Ok((input.into_tensor(), ratio))
    }

    fn decode(&self, outputs: TVec<TValue>, ratio: f32) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[1] <= BOX_FIELDS {
            return Err(anyhow!("unexpected detection output shape {:?}", shape));
        }
        let (fields, anchors) = (shape[1], shape[2]);

        let mut candidates = Vec::new();
        for n in 0..anchors {
            let mut best = (0usize, f32::NEG_INFINITY);
            for c in BOX_FIELDS..fields {
                let score = view[[0, c, n]];
                if score > best.1 {
                    best = (c - BOX_FIELDS, score);
                }
            }
            let (class_id, confidence) = (best.0 as u32, best.1);
            if confidence < self.confidence_threshold {
                continue;
            }
            if !self.classes.is_empty() && !self.classes.contains(&class_id) {
                continue;
            }
            let cx = view[[0, 0, n]] / ratio;
            let cy = view[[0, 1, n]] / ratio;
            let w = view[[0, 2, n]] / ratio;
            let h = view[[0, 3, n]] / ratio;
            let bbox = BBox::new(
                (cx - w / 2.0) as i32,
                (cy - h / 2.0) as i32,
                (cx + w / 2.0) as i32,
                (cy + h / 2.0) as i32,
            );
            candidates.push(Detection::new(bbox, class_id, confidence));
        }
        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

/// Greedy NMS: keep the highest-scoring box, drop anything overlapping it.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        if kept
            .iter()
            .all(|k| k.bbox.iou(&det.bbox) <= iou_threshold)
        {
            kept.push(det);
        }
    }
    kept
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        let (input, ratio) = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, ratio)
    }
}
