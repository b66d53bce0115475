use crate::detect::backend::{check_rgb_len, DetectorBackend};
use crate::detect::result::DetectionResult;
use crate::error::DetectionError;

/// Frame-differencing motion detector on luma.
///
/// A pixel counts as changed when its luma moved by more than `pixel_threshold`
/// since the previous frame; motion fires when the changed share reaches
/// `area_threshold`.
pub struct MotionBackend {
    pub pixel_threshold: u8,
    pub area_threshold: f32,
    previous: Option<(u32, u32, Vec<u8>)>,
}

impl Default for MotionBackend {
    fn default() -> Self {
        Self {
            pixel_threshold: 25,
            area_threshold: 0.01,
            previous: None,
        }
    }
}

impl MotionBackend {
    pub fn new(pixel_threshold: u8, area_threshold: f32) -> Self {
        Self {
            pixel_threshold,
            area_threshold,
            previous: None,
        }
    }
}

fn luma(pixels: &[u8]) -> Vec<u8> {
    pixels
        .chunks_exact(3)
        .map(|p| ((p[0] as u32 * 77 + p[1] as u32 * 150 + p[2] as u32 * 29) >> 8) as u8)
        .collect()
}

impl DetectorBackend for MotionBackend {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn detect(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<DetectionResult, DetectionError> {
        check_rgb_len(pixels, width, height)?;
        let current = luma(pixels);

        let result = match &self.previous {
            Some((w, h, prev)) if (*w, *h) == (width, height) && !current.is_empty() => {
                let changed = prev
                    .iter()
                    .zip(&current)
                    .filter(|(a, b)| a.abs_diff(**b) > self.pixel_threshold)
                    .count();
                let fraction = changed as f32 / current.len() as f32;
                let motion = fraction >= self.area_threshold;
                DetectionResult {
                    motion_detected: motion,
                    confidence: if motion { fraction.min(1.0) } else { 0.0 },
                    changed_fraction: fraction,
                }
            }
            // First frame or a resolution change: new reference, no verdict.
            _ => DetectionResult::default(),
        };

        self.previous = Some((width, height, current));
        Ok(result)
    }
}
