/// Result of running detection on a frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    /// Did we detect motion/presence?
    pub motion_detected: bool,
    /// Confidence of the detection (0..1).
    pub confidence: f32,
    /// Share of pixels that changed against the reference frame.
    pub changed_fraction: f32,
}

impl DetectionResult {
    pub fn triggered(&self) -> bool {
        self.motion_detected
    }
}
