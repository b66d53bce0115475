//! Session coordinator: wires one camera's workers together and owns shutdown.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use super::detector::{DetectorStats, DetectorWorker};
use super::reader::{ReaderStats, StreamReader};
use super::writer::{RecordingWriter, WriterStats};
use crate::channel::FrameChannel;
use crate::config::CameraConfig;
use crate::detect::DetectorBackend;
use crate::ingest::SourceConnector;
use crate::media::MediaSink;
use crate::signals::{SessionSignals, StopHandle};

/// Upper bound on how long the coordinator sleeps between supervision checks.
const SUPERVISE_INTERVAL: Duration = Duration::from_millis(50);

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopCause {
    Requested,
    DurationElapsed,
    WorkerExited,
}

/// Summary returned once every worker has exited.
#[derive(Clone, Debug)]
pub struct SessionReport {
    pub device_name: String,
    pub cause: StopCause,
    pub elapsed: Duration,
    pub reader: ReaderStats,
    pub detector: DetectorStats,
    pub writer: WriterStats,
}

pub struct SessionCoordinator<C, S> {
    config: Arc<CameraConfig>,
    signals: Arc<SessionSignals>,
    connector: C,
    backend: Box<dyn DetectorBackend>,
    sink: S,
}

impl<C, S> SessionCoordinator<C, S>
where
    C: SourceConnector + 'static,
    S: MediaSink + 'static,
{
    pub fn new(
        config: CameraConfig,
        connector: C,
        backend: Box<dyn DetectorBackend>,
        sink: S,
    ) -> Result<Self> {
        config
            .validate()
            .with_context(|| format!("invalid config for camera '{}'", config.device_name))?;
        Ok(Self {
            config: Arc::new(config),
            signals: SessionSignals::new(),
            connector,
            backend,
            sink,
        })
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// Shared signals, for observers. Workers own every write.
    pub fn signals(&self) -> Arc<SessionSignals> {
        Arc::clone(&self.signals)
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(Arc::clone(&self.signals))
    }

    /// Run the session to completion. Blocks until all three workers have exited.
    pub fn run(self) -> Result<SessionReport> {
        let Self {
            config,
            signals,
            connector,
            backend,
            sink,
        } = self;
        let device = config.device_name.clone();
        let capacity = config.timing.channel_capacity;
        let detection = FrameChannel::new("detection", capacity);
        let recording = FrameChannel::new("recording", capacity);

        let reader = StreamReader::new(
            Arc::clone(&config),
            Arc::clone(&signals),
            connector,
            detection.clone(),
            recording.clone(),
        );
        let detector = DetectorWorker::new(
            Arc::clone(&config),
            Arc::clone(&signals),
            backend,
            detection,
        );
        let writer = RecordingWriter::new(
            Arc::clone(&config),
            Arc::clone(&signals),
            sink,
            recording,
        );

        let started = Instant::now();
        let reader_handle = spawn_worker(&device, "reader", &signals, move || reader.run())?;
        let detector_handle =
            match spawn_worker(&device, "detector", &signals, move || detector.run()) {
                Ok(handle) => handle,
                Err(e) => {
                    let _ = reader_handle.join();
                    return Err(e);
                }
            };
        let writer_handle = match spawn_worker(&device, "writer", &signals, move || writer.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                let _ = reader_handle.join();
                let _ = detector_handle.join();
                return Err(e);
            }
        };
        log::info!("session[{}]: running", device);

        let cause = loop {
            if signals.is_stopped() {
                break StopCause::Requested;
            }
            let mut pause = SUPERVISE_INTERVAL;
            if let Some(limit) = config.session_duration.limit() {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    log::info!("session[{}]: duration {:?} elapsed", device, limit);
                    signals.request_stop();
                    break StopCause::DurationElapsed;
                }
                pause = pause.min(limit - elapsed);
            }
            if reader_handle.is_finished()
                || detector_handle.is_finished()
                || writer_handle.is_finished()
            {
                log::error!("session[{}]: a worker exited unexpectedly", device);
                signals.request_stop();
                break StopCause::WorkerExited;
            }
            signals.sleep_unless_stopped(pause);
        };

        let reader_stats = reader_handle.join();
        let detector_stats = detector_handle.join();
        let writer_stats = writer_handle.join();
        let elapsed = started.elapsed();
        log::info!("session[{}]: all workers stopped after {:?}", device, elapsed);

        Ok(SessionReport {
            device_name: device,
            cause,
            elapsed,
            reader: reader_stats.map_err(|_| anyhow!("stream reader thread panicked"))?,
            detector: detector_stats.map_err(|_| anyhow!("detector thread panicked"))?,
            writer: writer_stats.map_err(|_| anyhow!("recording writer thread panicked"))?,
        })
    }
}

fn spawn_worker<T, F>(
    device: &str,
    role: &str,
    signals: &Arc<SessionSignals>,
    work: F,
) -> Result<JoinHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    std::thread::Builder::new()
        .name(format!("{}-{}", device, role))
        .spawn(work)
        .map_err(|e| {
            signals.request_stop();
            anyhow!("failed to spawn {} thread for {}: {}", role, device, e)
        })
}
