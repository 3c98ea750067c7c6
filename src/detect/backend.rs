use anyhow::Result;

use crate::detect::result::Detection;

/// Detector backend trait.
///
/// A backend turns one decoded RGB frame into candidate bounding boxes. The
/// measurement pipeline treats it as an external collaborator: any error is
/// logged by the caller and the frame is processed as having no detections.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame of packed RGB8 pixels (`width * height * 3`).
    ///
    /// Class filtering may happen here or in the caller's `ClassFilter`.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Forget per-stream state. Called when a new producer connects.
    fn reset(&mut self) {}
}
