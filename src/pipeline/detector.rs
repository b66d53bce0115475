//! Detector worker: runs the detector backend over the detection channel and
//! raises the recording trigger and the high-resolution request.

use std::sync::Arc;

use crate::channel::{FrameChannel, Pop};
use crate::config::{CameraConfig, RetriggerPolicy};
use crate::detect::DetectorBackend;
use crate::signals::SessionSignals;

#[derive(Clone, Debug, Default)]
pub struct DetectorStats {
    pub frames_analyzed: u64,
    pub frames_skipped: u64,
    pub detections: u64,
    pub failures: u64,
    pub triggers_raised: u64,
}

pub struct DetectorWorker {
    config: Arc<CameraConfig>,
    signals: Arc<SessionSignals>,
    backend: Box<dyn DetectorBackend>,
    frames: FrameChannel,
    stats: DetectorStats,
}

impl DetectorWorker {
    pub fn new(
        config: Arc<CameraConfig>,
        signals: Arc<SessionSignals>,
        backend: Box<dyn DetectorBackend>,
        frames: FrameChannel,
    ) -> Self {
        Self {
            config,
            signals,
            backend,
            frames,
            stats: DetectorStats::default(),
        }
    }

    pub fn run(mut self) -> DetectorStats {
        let device = self.config.device_name.clone();
        if self.config.detection_enabled {
            if let Err(e) = self.backend.warm_up() {
                log::warn!("DetectorWorker[{}]: warm-up failed: {}", device, e);
            }
            log::info!(
                "DetectorWorker[{}]: running backend '{}' at {}x{}",
                device,
                self.backend.name(),
                self.config.frame_width,
                self.config.frame_height
            );
        } else {
            log::info!("DetectorWorker[{}]: detection disabled", device);
        }

        while !self.signals.is_stopped() {
            match self.frames.pop_timeout(self.config.timing.poll_interval) {
                Pop::Frame(frame) => {
                    if !self.config.detection_enabled {
                        self.stats.frames_skipped += 1;
                        continue;
                    }
                    let pixels =
                        frame.scaled_pixels(self.config.frame_width, self.config.frame_height);
                    let (width, height) = (self.config.frame_width, self.config.frame_height);
                    self.stats.frames_analyzed += 1;
                    match self.backend.detect(&pixels, width, height) {
                        Ok(result) if result.triggered() => {
                            self.stats.detections += 1;
                            log::debug!(
                                "DetectorWorker[{}]: detection on frame {} (conf={:.2})",
                                device,
                                frame.sequence,
                                result.confidence
                            );
                            self.on_detection();
                        }
                        Ok(_) => {}
                        Err(e) => {
                            self.stats.failures += 1;
                            log::warn!(
                                "DetectorWorker[{}]: skipping frame {}: {}",
                                device,
                                frame.sequence,
                                e
                            );
                        }
                    }
                }
                Pop::Empty => continue,
                Pop::Closed => break,
            }
        }

        log::info!(
            "DetectorWorker[{}]: stopped ({} analyzed, {} detections)",
            device,
            self.stats.frames_analyzed,
            self.stats.detections
        );
        self.stats
    }

    /// Raise the recording trigger and the high-res request unless a window is
    /// already open (under `Ignore`) or a trigger is pending.
    ///
    /// Every raised trigger carries a high-res request: an open window may close
    /// before the writer sees the trigger, and then the trigger opens a new one.
    fn on_detection(&mut self) {
        if !self.config.recording_enabled {
            return;
        }
        let active = self.signals.recording_active();
        if active && self.config.retrigger == RetriggerPolicy::Ignore {
            return;
        }
        if self.signals.raise_recording_trigger() {
            self.stats.triggers_raised += 1;
            if !active {
                log::info!(
                    "DetectorWorker[{}]: motion detected, requesting recording",
                    self.config.device_name
                );
            }
            self.signals.request_high_res();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DetectionResult;
    use crate::error::DetectionError;
    use crate::frame::Frame;
    use std::time::{Duration, Instant};

    struct AlwaysMotion;

    impl DetectorBackend for AlwaysMotion {
        fn name(&self) -> &'static str {
            "always"
        }

        fn detect(
            &mut self,
            _pixels: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<DetectionResult, DetectionError> {
            Ok(DetectionResult {
                motion_detected: true,
                confidence: 1.0,
                changed_fraction: 1.0,
            })
        }
    }

    fn frame(seq: u64) -> Frame {
        Frame::new(vec![0u8; 12], 2, 2, seq, Arc::from("stub://cam/main")).unwrap()
    }

    #[test]
    fn extend_trigger_during_window_also_requests_high_res() {
        let mut config = CameraConfig::new("dock", "stub://cam/sub", "stub://cam/main");
        config.retrigger = RetriggerPolicy::Extend;
        config.frame_width = 2;
        config.frame_height = 2;
        config.timing.poll_interval = Duration::from_millis(5);
        let signals = SessionSignals::new();
        signals.set_recording_active(true);
        let frames = FrameChannel::new("detection", 4);
        frames.push(frame(1));

        let worker = DetectorWorker::new(
            Arc::new(config),
            Arc::clone(&signals),
            Box::new(AlwaysMotion),
            frames,
        );
        let handle = std::thread::spawn(move || worker.run());

        let deadline = Instant::now() + Duration::from_secs(5);
        while !signals.recording_trigger_pending() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        signals.request_stop();
        let stats = handle.join().unwrap();

        assert_eq!(stats.triggers_raised, 1);
        assert!(signals.recording_trigger_pending());
        assert_eq!(signals.take_resolution_requests(), (true, false));
    }

    #[test]
    fn ignore_policy_skips_detection_during_window() {
        let mut config = CameraConfig::new("dock", "stub://cam/sub", "stub://cam/main");
        config.frame_width = 2;
        config.frame_height = 2;
        config.timing.poll_interval = Duration::from_millis(5);
        let signals = SessionSignals::new();
        signals.set_recording_active(true);
        let frames = FrameChannel::new("detection", 4);
        frames.push(frame(1));

        let worker = DetectorWorker::new(
            Arc::new(config),
            Arc::clone(&signals),
            Box::new(AlwaysMotion),
            frames.clone(),
        );
        let handle = std::thread::spawn(move || worker.run());

        let deadline = Instant::now() + Duration::from_secs(5);
        while !frames.is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        std::thread::sleep(Duration::from_millis(20));
        signals.request_stop();
        let stats = handle.join().unwrap();

        assert_eq!(stats.detections, 1);
        assert_eq!(stats.triggers_raised, 0);
        assert_eq!(signals.take_resolution_requests(), (false, false));
    }
}
