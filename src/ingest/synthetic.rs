//! Synthetic frame source for `stub://` addresses.
//!
//! Produces a static background with mild sensor noise. Every `scene_period`
//! frames a bright block enters the scene for `event_frames` frames, which is
//! enough for the motion backend to fire.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use super::FrameSource;
use crate::error::SourceError;
use crate::frame::{Frame, BYTES_PER_PIXEL};

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    pub scene_period: u64,
    pub event_frames: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            scene_period: 50,
            event_frames: 10,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    address: Arc<str>,
    frame_count: u64,
    closed: bool,
}

impl SyntheticSource {
    pub fn new(address: &str, config: SyntheticConfig) -> Self {
        log::info!("SyntheticSource: connected to {} (synthetic)", address);
        Self {
            config,
            address: Arc::from(address),
            frame_count: 0,
            closed: false,
        }
    }

    fn in_event(&self) -> bool {
        self.config.scene_period > 0
            && self.frame_count % self.config.scene_period
                >= self
                    .config
                    .scene_period
                    .saturating_sub(self.config.event_frames)
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let w = self.config.width as usize;
        let h = self.config.height as usize;
        let mut rng = rand::thread_rng();
        let mut pixels = vec![0u8; w * h * BYTES_PER_PIXEL];
        for (i, px) in pixels.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let x = i % w;
            let base = (x * 160 / w.max(1)) as i16 + 40;
            let noisy = (base + rng.gen_range(-2..=2)).clamp(0, 255) as u8;
            px.fill(noisy);
        }
        if self.in_event() {
            // Block covering a quarter of the frame, drifting right with each frame.
            let bw = w / 2;
            let bh = h / 2;
            let offset = (self.frame_count as usize * 4) % (w - bw).max(1);
            for y in h / 4..h / 4 + bh {
                for x in offset..offset + bw {
                    let idx = (y * w + x) * BYTES_PER_PIXEL;
                    pixels[idx..idx + BYTES_PER_PIXEL].fill(250);
                }
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn address(&self) -> &str {
        &self.address
    }

    fn read(&mut self) -> Result<Frame, SourceError> {
        if self.closed {
            return Err(SourceError::ReadFailed("source closed".to_string()));
        }
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
            Arc::clone(&self.address),
        )
        .map_err(|e| SourceError::ReadFailed(e.to_string()))
    }

    fn close(&mut self, _timeout: Duration) -> Result<(), SourceError> {
        self.closed = true;
        log::debug!("SyntheticSource: released {}", self.address);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SyntheticConfig {
        SyntheticConfig {
            width: 32,
            height: 16,
            scene_period: 5,
            event_frames: 2,
        }
    }

    #[test]
    fn produces_sequenced_frames() -> Result<(), SourceError> {
        let mut source = SyntheticSource::new("stub://test", small());
        let first = source.read()?;
        let second = source.read()?;
        assert_eq!((first.width, first.height), (32, 16));
        assert_eq!(first.sequence + 1, second.sequence);
        assert_eq!(&*second.origin, "stub://test");
        Ok(())
    }

    #[test]
    fn read_after_close_fails() {
        let mut source = SyntheticSource::new("stub://test", small());
        source.close(Duration::from_millis(10)).unwrap();
        assert!(matches!(source.read(), Err(SourceError::ReadFailed(_))));
    }

    #[test]
    fn event_frames_contain_bright_block() -> Result<(), SourceError> {
        let mut source = SyntheticSource::new("stub://test", small());
        let mut saw_event = false;
        for _ in 0..5 {
            let frame = source.read()?;
            if frame.pixels().iter().any(|&p| p == 250) {
                saw_event = true;
            }
        }
        assert!(saw_event);
        Ok(())
    }
}
