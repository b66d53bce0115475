//! Decoded frames.
//!
//! A `Frame` is owned by exactly one holder at a time: the source that produced it,
//! a channel, or the worker that dequeued it. `Frame` is not `Clone`: the reader
//! copies a frame only to fan it out to its two output channels.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use anyhow::{anyhow, Result};

/// Bytes per pixel (RGB24).
pub const BYTES_PER_PIXEL: usize = 3;

/// Decoded RGB24 frame with its capture time.
///
/// ```compile_fail
/// use std::sync::Arc;
/// let frame = ipcam_recorder::Frame::new(vec![0; 3], 1, 1, 1, Arc::from("stub://cam")).unwrap();
/// let copy = frame.clone();
/// ```
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic capture instant. Used for recording-window membership.
    pub captured_at: Instant,
    /// Wall-clock capture time. Used for artifact metadata.
    pub timestamp: SystemTime,
    /// Per-source sequence number, starting at 1 after each open.
    pub sequence: u64,
    /// Address of the source this frame was read from.
    pub origin: Arc<str>,
}

impl Frame {
    /// Create a frame captured now. Fails when the buffer does not match the dimensions.
    pub fn new(
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        sequence: u64,
        origin: Arc<str>,
    ) -> Result<Self> {
        let expected = expected_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            captured_at: Instant::now(),
            timestamp: SystemTime::now(),
            sequence,
            origin,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// Copy for fan-out. Keeps the original capture time.
    pub(crate) fn duplicate(&self) -> Self {
        Self {
            pixels: self.pixels.clone(),
            width: self.width,
            height: self.height,
            captured_at: self.captured_at,
            timestamp: self.timestamp,
            sequence: self.sequence,
            origin: Arc::clone(&self.origin),
        }
    }

    /// Pixels scaled to `width`x`height` with nearest-neighbour sampling.
    ///
    /// Borrows when the frame already has the requested size.
    pub fn scaled_pixels(&self, width: u32, height: u32) -> Cow<'_, [u8]> {
        if (width, height) == (self.width, self.height)
            || width == 0
            || height == 0
            || self.pixels.is_empty()
        {
            return Cow::Borrowed(&self.pixels);
        }
        let (sw, sh) = (self.width as usize, self.height as usize);
        let (dw, dh) = (width as usize, height as usize);
        let mut out = vec![0u8; dw * dh * BYTES_PER_PIXEL];
        for y in 0..dh {
            let sy = y * sh / dh;
            for x in 0..dw {
                let sx = x * sw / dw;
                let src = (sy * sw + sx) * BYTES_PER_PIXEL;
                let dst = (y * dw + x) * BYTES_PER_PIXEL;
                out[dst..dst + BYTES_PER_PIXEL]
                    .copy_from_slice(&self.pixels[src..src + BYTES_PER_PIXEL]);
            }
        }
        Cow::Owned(out)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

fn expected_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(BYTES_PER_PIXEL))
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Arc<str> {
        Arc::from("stub://test")
    }

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(Frame::new(vec![0u8; 5], 2, 2, 1, origin()).is_err());
    }

    #[test]
    fn scaling_to_same_size_borrows() -> Result<()> {
        let frame = Frame::new(vec![7u8; 12], 2, 2, 1, origin())?;
        assert!(matches!(frame.scaled_pixels(2, 2), Cow::Borrowed(_)));
        Ok(())
    }

    #[test]
    fn downscale_samples_nearest_pixel() -> Result<()> {
        // 4x2 frame, left half 10, right half 200.
        let mut pixels = Vec::new();
        for _row in 0..2 {
            for x in 0..4 {
                let v = if x < 2 { 10 } else { 200 };
                pixels.extend_from_slice(&[v, v, v]);
            }
        }
        let frame = Frame::new(pixels, 4, 2, 1, origin())?;
        let scaled = frame.scaled_pixels(2, 1);
        assert_eq!(scaled.as_ref(), &[10, 10, 10, 200, 200, 200]);
        Ok(())
    }

    #[test]
    fn duplicate_keeps_capture_time() -> Result<()> {
        let frame = Frame::new(vec![1u8; 3], 1, 1, 9, origin())?;
        let copy = frame.duplicate();
        assert_eq!(copy.captured_at, frame.captured_at);
        assert_eq!(copy.sequence, 9);
        assert_eq!(copy.pixels(), frame.pixels());
        Ok(())
    }
}
