use anyhow::{anyhow, Result};
use std::collections::VecDeque;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BBox, Detection};

const DEFAULT_CELL_PX: u32 = 8;
const DEFAULT_DIFF_THRESHOLD: f32 = 25.0;
const DEFAULT_LEARNING_RATE: f32 = 0.05;
const DEFAULT_MIN_CELLS: usize = 6;

/// CPU backend: running-average background model, per-cell luminance
/// differencing and 4-connected grouping of changed cells into boxes.
///
/// Needs no model file. Every blob is reported with the configured class id
/// so that it passes the vehicle class filter.
pub struct CpuBackend {
    cell_px: u32,
    diff_threshold: f32,
    learning_rate: f32,
    min_cells: usize,
    blob_class: u32,
    background: Option<Background>,
}

struct Background {
    cols: usize,
    rows: usize,
    width: u32,
    height: u32,
    luma: Vec<f32>,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self {
            cell_px: DEFAULT_CELL_PX,
            diff_threshold: DEFAULT_DIFF_THRESHOLD,
            learning_rate: DEFAULT_LEARNING_RATE,
            min_cells: DEFAULT_MIN_CELLS,
            blob_class: 2,
            background: None,
        }
    }
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cell_size(mut self, cell_px: u32) -> Self {
        self.cell_px = cell_px.max(1);
        self
    }

    pub fn with_min_cells(mut self, min_cells: usize) -> Self {
        self.min_cells = min_cells.max(1);
        self
    }

    pub fn with_threshold(mut self, diff_threshold: f32) -> Self {
        self.diff_threshold = diff_threshold;
        self
    }

    pub fn with_blob_class(mut self, class_id: u32) -> Self {
        self.blob_class = class_id;
        self
    }

    fn cell_luma(&self, pixels: &[u8], width: u32, height: u32) -> (usize, usize, Vec<f32>) {
        let cols = width.div_ceil(self.cell_px) as usize;
        let rows = height.div_ceil(self.cell_px) as usize;
        let mut sums = vec![0u64; cols * rows];
        let mut counts = vec![0u32; cols * rows];
        for y in 0..height {
            let row = (y / self.cell_px) as usize;
            for x in 0..width {
                let idx = ((y * width + x) * 3) as usize;
                let (r, g, b) = (pixels[idx] as u64, pixels[idx + 1] as u64, pixels[idx + 2] as u64);
                let cell = row * cols + (x / self.cell_px) as usize;
                sums[cell] += (r * 77 + g * 150 + b * 29) >> 8;
                counts[cell] += 1;
            }
        }
        let luma = sums
            .iter()
            .zip(counts.iter())
            .map(|(&sum, &count)| if count == 0 { 0.0 } else { sum as f32 / count as f32 })
            .collect();
        (cols, rows, luma)
    }

    fn group_cells(&self, mask: &[bool], cols: usize, rows: usize, width: u32, height: u32) -> Vec<Detection> {
        let mut seen = vec![false; mask.len()];
        let mut out = Vec::new();
        let mut queue = VecDeque::new();
        for start in 0..mask.len() {
            if !mask[start] || seen[start] {
                continue;
            }
            seen[start] = true;
            queue.push_back(start);
            let (mut min_c, mut min_r, mut max_c, mut max_r) = (cols, rows, 0usize, 0usize);
            let mut cells = 0usize;
            while let Some(idx) = queue.pop_front() {
                let (c, r) = (idx % cols, idx / cols);
                cells += 1;
                min_c = min_c.min(c);
                min_r = min_r.min(r);
                max_c = max_c.max(c);
                max_r = max_r.max(r);
                let mut neighbours = Vec::with_capacity(4);
                if c > 0 {
                    neighbours.push(idx - 1);
                }
                if c + 1 < cols {
                    neighbours.push(idx + 1);
                }
                if r > 0 {
                    neighbours.push(idx - cols);
                }
                if r + 1 < rows {
                    neighbours.push(idx + cols);
                }
                for n in neighbours {
                    if mask[n] && !seen[n] {
                        seen[n] = true;
                        queue.push_back(n);
                    }
                }
            }
            if cells < self.min_cells {
                continue;
            }
            let cell = self.cell_px as i32;
            let bbox = BBox::new(
                min_c as i32 * cell,
                min_r as i32 * cell,
                ((max_c as i32 + 1) * cell).min(width as i32),
                ((max_r as i32 + 1) * cell).min(height as i32),
            );
            let covered = (max_c - min_c + 1) * (max_r - min_r + 1);
            out.push(Detection::new(
                bbox,
                self.blob_class,
                cells as f32 / covered as f32,
            ));
        }
        out
    }
}

impl DetectorBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected,
                pixels.len()
            ));
        }

        let (cols, rows, luma) = self.cell_luma(pixels, width, height);
        let primed = matches!(
            &self.background,
            Some(bg) if bg.width == width && bg.height == height
        );
        if !primed {
            self.background = Some(Background {
                cols,
                rows,
                width,
                height,
                luma,
            });
            return Ok(Vec::new());
        }
        let Some(background) = self.background.as_mut() else {
            return Ok(Vec::new());
        };

        let mut mask = vec![false; luma.len()];
        for (i, (&current, bg)) in luma.iter().zip(background.luma.iter_mut()).enumerate() {
            mask[i] = (current - *bg).abs() > self.diff_threshold;
            *bg += self.learning_rate * (current - *bg);
        }
        let (cols, rows) = (background.cols, background.rows);
        Ok(self.group_cells(&mask, cols, rows, width, height))
    }

    fn reset(&mut self) {
        self.background = None;
    }
}
