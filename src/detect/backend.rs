use crate::detect::backends::{ChangeBackend, MotionBackend};
use crate::detect::result::DetectionResult;
use crate::error::DetectionError;

/// Names accepted by `backend_by_name`.
pub const BACKEND_NAMES: &[&str] = &["motion", "change"];

/// Detector backend trait.
///
/// A backend is owned by a single detector worker, so `detect` takes `&mut self`
/// and may keep state between frames (e.g. a reference frame).
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on an RGB24 frame already scaled to the configured size.
    ///
    /// Implementations must treat the pixel slice as read-only and ephemeral.
    fn detect(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<DetectionResult, DetectionError>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<(), DetectionError> {
        Ok(())
    }
}

/// Construct a fresh backend. Each session needs its own instance.
pub fn backend_by_name(name: &str) -> Option<Box<dyn DetectorBackend>> {
    match name {
        "motion" => Some(Box::new(MotionBackend::default())),
        "change" => Some(Box::new(ChangeBackend::default())),
        _ => None,
    }
}

pub(crate) fn check_rgb_len(pixels: &[u8], width: u32, height: u32) -> Result<(), DetectionError> {
    let expected = (width as usize) * (height as usize) * 3;
    if pixels.len() != expected {
        return Err(DetectionError::Failed(format!(
            "RGB frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_resolve() {
        for name in BACKEND_NAMES {
            let backend = backend_by_name(name).expect("backend");
            assert_eq!(backend.name(), *name);
        }
        assert!(backend_by_name("faces").is_none());
    }
}
