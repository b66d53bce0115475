//! Recording writer: owns the media sink and the single open recording window.
//!
//! ```text
//!   Idle --trigger--> Recording --window elapsed--> Idle (+ low-res request)
//!                        |  \--write/create error--> Idle (+ low-res request)
//!                        \--stop--> closed (flushed)
//! ```

use std::mem;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;

use crate::channel::{FrameChannel, Pop};
use crate::config::{CameraConfig, RetriggerPolicy};
use crate::frame::Frame;
use crate::media::{MediaArtifact, MediaSink};
use crate::signals::SessionSignals;

#[derive(Clone, Debug, Default)]
pub struct WriterStats {
    pub windows_opened: u64,
    pub windows_completed: u64,
    pub windows_abandoned: u64,
    pub windows_extended: u64,
    pub frames_written: u64,
    pub frames_discarded: u64,
    /// Artifacts of completed windows, in order. Abandoned windows are not listed.
    pub artifacts: Vec<PathBuf>,
}

/// The open recording window.
struct RecordingWindow {
    /// Frames captured before this instant belong to no window.
    started_at: Instant,
    /// Frames captured at or after this instant are outside the window.
    deadline: Instant,
    artifact: Box<dyn MediaArtifact>,
    frames_written: u64,
}

enum WriterState {
    Idle,
    Recording(RecordingWindow),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CloseReason {
    Elapsed,
    Failed,
    Shutdown,
}

pub struct RecordingWriter<S: MediaSink> {
    config: Arc<CameraConfig>,
    signals: Arc<SessionSignals>,
    sink: S,
    frames: FrameChannel,
    state: WriterState,
    stats: WriterStats,
}

impl<S: MediaSink> RecordingWriter<S> {
    pub fn new(
        config: Arc<CameraConfig>,
        signals: Arc<SessionSignals>,
        sink: S,
        frames: FrameChannel,
    ) -> Self {
        Self {
            config,
            signals,
            sink,
            frames,
            state: WriterState::Idle,
            stats: WriterStats::default(),
        }
    }

    pub fn run(mut self) -> WriterStats {
        log::info!(
            "RecordingWriter[{}]: ready (window {:?}, output {})",
            self.config.device_name,
            self.config.recording_window,
            self.config.output_dir.display()
        );

        while !self.signals.is_stopped() {
            self.expire_window();
            self.poll_trigger();
            match self.frames.pop_timeout(self.config.timing.poll_interval) {
                Pop::Frame(frame) => self.handle_frame(frame),
                Pop::Empty => {}
                Pop::Closed => break,
            }
        }

        self.close_window(CloseReason::Shutdown);
        log::info!(
            "RecordingWriter[{}]: stopped ({} windows, {} frames written)",
            self.config.device_name,
            self.stats.windows_opened,
            self.stats.frames_written
        );
        self.stats
    }

    fn window_len(&self) -> Duration {
        self.config.recording_window
    }

    fn expire_window(&mut self) {
        if let WriterState::Recording(window) = &self.state {
            if Instant::now() >= window.deadline {
                self.close_window(CloseReason::Elapsed);
            }
        }
    }

    /// The trigger is cleared only after `recording_active` reflects the outcome,
    /// so the reader never sees both flags down while a window is opening.
    fn poll_trigger(&mut self) {
        if !self.signals.recording_trigger_pending() {
            return;
        }
        let window_len = self.window_len();
        if let WriterState::Recording(window) = &mut self.state {
            match self.config.retrigger {
                RetriggerPolicy::Ignore => {
                    log::debug!(
                        "RecordingWriter[{}]: trigger while recording ignored",
                        self.config.device_name
                    );
                }
                RetriggerPolicy::Extend => {
                    window.deadline = Instant::now() + window_len;
                    self.stats.windows_extended += 1;
                    log::info!(
                        "RecordingWriter[{}]: window extended for {:?}",
                        self.config.device_name,
                        window_len
                    );
                }
            }
        } else if self.config.recording_enabled {
            self.open_window();
            return;
        }
        self.signals.take_recording_trigger();
    }

    fn open_window(&mut self) {
        let opened = self.sink.create(
            &self.config.output_dir,
            &self.config.device_name,
            Local::now(),
        );
        match opened {
            Ok(artifact) => {
                let started_at = Instant::now();
                log::info!(
                    "RecordingWriter[{}]: recording to {}",
                    self.config.device_name,
                    artifact.path().display()
                );
                self.state = WriterState::Recording(RecordingWindow {
                    started_at,
                    deadline: started_at + self.window_len(),
                    artifact,
                    frames_written: 0,
                });
                self.stats.windows_opened += 1;
                self.signals.set_recording_active(true);
                self.signals.take_recording_trigger();
            }
            Err(e) => {
                self.stats.windows_abandoned += 1;
                log::error!(
                    "RecordingWriter[{}]: window abandoned: {}",
                    self.config.device_name,
                    e
                );
                // Consumed before the low-res request so the reader does not
                // read a stale trigger as a pending window.
                self.signals.take_recording_trigger();
                self.signals.request_low_res();
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        let WriterState::Recording(window) = &mut self.state else {
            self.stats.frames_discarded += 1;
            return;
        };
        if frame.captured_at < window.started_at {
            self.stats.frames_discarded += 1;
            return;
        }
        if frame.captured_at >= window.deadline {
            self.stats.frames_discarded += 1;
            self.close_window(CloseReason::Elapsed);
            return;
        }
        match window.artifact.write(&frame) {
            Ok(()) => {
                window.frames_written += 1;
                self.stats.frames_written += 1;
            }
            Err(e) => {
                log::error!(
                    "RecordingWriter[{}]: window abandoned: {}",
                    self.config.device_name,
                    e
                );
                self.close_window(CloseReason::Failed);
            }
        }
    }

    fn close_window(&mut self, reason: CloseReason) {
        let WriterState::Recording(window) = mem::replace(&mut self.state, WriterState::Idle)
        else {
            return;
        };
        let frames = window.frames_written;
        match window.artifact.close() {
            Ok(path) => {
                log::info!(
                    "RecordingWriter[{}]: closed {} ({} frames, {:?})",
                    self.config.device_name,
                    path.display(),
                    frames,
                    reason
                );
                if reason == CloseReason::Failed {
                    self.stats.windows_abandoned += 1;
                } else {
                    self.stats.windows_completed += 1;
                    self.stats.artifacts.push(path);
                }
            }
            Err(e) => {
                self.stats.windows_abandoned += 1;
                log::error!(
                    "RecordingWriter[{}]: close failed: {}",
                    self.config.device_name,
                    e
                );
            }
        }
        self.signals.set_recording_active(false);
        if reason != CloseReason::Shutdown {
            self.signals.request_low_res();
        }
    }
}
