use sha2::{Digest, Sha256};

use crate::detect::backend::{check_rgb_len, DetectorBackend};
use crate::detect::result::DetectionResult;
use crate::error::DetectionError;

/// Fires on any change in frame content. Only useful with lossless, noise-free
/// sources (test patterns, still-image feeds).
#[derive(Default)]
pub struct ChangeBackend {
    last_hash: Option<[u8; 32]>,
}

impl DetectorBackend for ChangeBackend {
    fn name(&self) -> &'static str {
        "change"
    }

    fn detect(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<DetectionResult, DetectionError> {
        check_rgb_len(pixels, width, height)?;
        let current_hash: [u8; 32] = Sha256::digest(pixels).into();

        let changed = self.last_hash.is_some_and(|prev| prev != current_hash);

        self.last_hash = Some(current_hash);

        if changed {
            Ok(DetectionResult {
                motion_detected: true,
                confidence: 1.0,
                changed_fraction: 1.0,
            })
        } else {
            Ok(DetectionResult::default())
        }
    }
}
