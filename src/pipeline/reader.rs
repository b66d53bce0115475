//! Stream reader: owns the frame source and fans frames out to the consumers.

use std::sync::Arc;
use std::time::Instant;

use crate::channel::FrameChannel;
use crate::config::CameraConfig;
use crate::ingest::{FrameSource, SourceConnector};
use crate::signals::SessionSignals;

/// Which of the two configured addresses is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionMode {
    Low,
    High,
}

impl ResolutionMode {
    pub fn address(self, config: &CameraConfig) -> &str {
        match self {
            Self::Low => &config.low_res_address,
            Self::High => &config.high_res_address,
        }
    }
}

/// Counters reported when the reader exits.
#[derive(Clone, Debug, Default)]
pub struct ReaderStats {
    pub frames_read: u64,
    pub read_failures: u64,
    pub source_opens: u64,
    pub stream_lost_events: u64,
    pub mode_switches: u64,
    pub dropped_detection: u64,
    pub dropped_recording: u64,
    pub drained_on_stop: u64,
}

pub struct StreamReader<C: SourceConnector> {
    config: Arc<CameraConfig>,
    signals: Arc<SessionSignals>,
    connector: C,
    detection: FrameChannel,
    recording: FrameChannel,
    source: Option<Box<dyn FrameSource>>,
    mode: ResolutionMode,
    consecutive_failures: u32,
    stats: ReaderStats,
}

impl<C: SourceConnector> StreamReader<C> {
    pub fn new(
        config: Arc<CameraConfig>,
        signals: Arc<SessionSignals>,
        connector: C,
        detection: FrameChannel,
        recording: FrameChannel,
    ) -> Self {
        Self {
            config,
            signals,
            connector,
            detection,
            recording,
            source: None,
            mode: ResolutionMode::Low,
            consecutive_failures: 0,
            stats: ReaderStats::default(),
        }
    }

    /// Run until `stop`. Never gives up on the stream.
    pub fn run(mut self) -> ReaderStats {
        let device = self.config.device_name.clone();
        log::info!(
            "StreamReader[{}]: starting on {}",
            device,
            self.config.low_res_address
        );
        self.reopen();
        let mut last_health_log = Instant::now();

        while !self.signals.is_stopped() {
            self.apply_resolution_requests();

            let read = match self.source.as_mut() {
                Some(source) => source.read(),
                None => Err(crate::error::SourceError::connection(
                    self.mode.address(&self.config),
                    "no open source",
                )),
            };

            match read {
                Ok(frame) => {
                    self.consecutive_failures = 0;
                    self.stats.frames_read += 1;
                    self.detection.push(frame.duplicate());
                    self.recording.push(frame);
                    self.signals
                        .sleep_unless_stopped(self.config.timing.ingest_interval);
                }
                Err(e) => self.handle_failure(e),
            }

            if last_health_log.elapsed() >= self.config.timing.health_log_interval {
                log::info!(
                    "StreamReader[{}]: mode={:?} frames={} failures={} dropped(det={}, rec={})",
                    device,
                    self.mode,
                    self.stats.frames_read,
                    self.stats.read_failures,
                    self.detection.dropped(),
                    self.recording.dropped()
                );
                last_health_log = Instant::now();
            }
        }

        self.release();
        self.stats.drained_on_stop = (self.detection.drain() + self.recording.drain()) as u64;
        self.stats.dropped_detection = self.detection.dropped();
        self.stats.dropped_recording = self.recording.dropped();
        log::info!(
            "StreamReader[{}]: stopped after {} frames",
            device,
            self.stats.frames_read
        );
        self.stats
    }

    /// Consume pending mode requests and reopen if the target differs.
    fn apply_resolution_requests(&mut self) {
        let target = match self.signals.take_resolution_requests() {
            (false, false) => return,
            (true, false) => ResolutionMode::High,
            (false, true) => ResolutionMode::Low,
            // Both pending: an open or pending window means high resolution is current.
            (true, true) => {
                if self.signals.recording_active() || self.signals.recording_trigger_pending() {
                    ResolutionMode::High
                } else {
                    ResolutionMode::Low
                }
            }
        };
        if target == self.mode {
            log::debug!(
                "StreamReader[{}]: already in {:?} mode",
                self.config.device_name,
                target
            );
            return;
        }
        log::info!(
            "StreamReader[{}]: switching {:?} -> {:?}",
            self.config.device_name,
            self.mode,
            target
        );
        self.mode = target;
        self.stats.mode_switches += 1;
        self.consecutive_failures = 0;
        self.reopen();
    }

    fn handle_failure(&mut self, err: crate::error::SourceError) {
        self.consecutive_failures += 1;
        self.stats.read_failures += 1;
        let device = &self.config.device_name;
        let address = self.mode.address(&self.config).to_string();

        let pause = if self.consecutive_failures > self.config.max_retries {
            self.stats.stream_lost_events += 1;
            log::error!(
                "StreamReader[{}]: stream lost at {} after {} consecutive failures ({}); retrying in {:?}",
                device,
                address,
                self.consecutive_failures,
                err,
                self.config.timing.reconnect_backoff
            );
            self.consecutive_failures = 0;
            self.config.timing.reconnect_backoff
        } else {
            log::warn!(
                "StreamReader[{}]: read from {} failed ({}/{}): {}",
                device,
                address,
                self.consecutive_failures,
                self.config.max_retries,
                err
            );
            self.config.timing.retry_interval
        };

        if self.signals.sleep_unless_stopped(pause) {
            return;
        }
        self.reopen();
    }

    /// Release the current source (bounded wait) and open the active address.
    fn reopen(&mut self) {
        self.release();
        let address = self.mode.address(&self.config).to_string();
        match self.connector.open(&address) {
            Ok(source) => {
                self.stats.source_opens += 1;
                log::debug!(
                    "StreamReader[{}]: opened {}",
                    self.config.device_name,
                    address
                );
                self.source = Some(source);
            }
            Err(e) => {
                log::warn!(
                    "StreamReader[{}]: open {} failed: {}",
                    self.config.device_name,
                    address,
                    e
                );
            }
        }
    }

    fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            if let Err(e) = source.close(self.config.timing.close_timeout) {
                log::warn!(
                    "StreamReader[{}]: release of {} incomplete: {}",
                    self.config.device_name,
                    source.address(),
                    e
                );
            }
        }
    }
}
