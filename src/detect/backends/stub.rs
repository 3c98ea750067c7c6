use anyhow::Result;
use std::collections::VecDeque;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;

/// Stub backend for tests and demos. Replays a fixed script of per-frame
/// detections, then reports nothing.
#[derive(Default)]
pub struct StubBackend {
    script: Vec<Vec<Detection>>,
    pending: VecDeque<Vec<Detection>>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detections to return for successive frames, one entry per frame.
    pub fn with_script(script: Vec<Vec<Detection>>) -> Self {
        Self {
            pending: script.iter().cloned().collect(),
            script,
        }
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<Vec<Detection>> {
        Ok(self.pending.pop_front().unwrap_or_default())
    }

    fn reset(&mut self) {
        self.pending = self.script.iter().cloned().collect();
    }
}
