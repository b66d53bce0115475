#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Local};

use ipcam_recorder::media::artifact_stem;
use ipcam_recorder::{
    CameraConfig, DetectionError, DetectionResult, DetectorBackend, Frame, FrameSource,
    MediaArtifact, MediaSink, SessionCoordinator, SessionReport, SinkError, SourceConnector,
    SourceError,
};

pub const LOW: &str = "test://cam/sub";
pub const HIGH: &str = "test://cam/main";

/// Camera config with millisecond pacing so scenarios finish quickly.
pub fn fast_config(name: &str, output_dir: &Path) -> CameraConfig {
    let mut cfg = CameraConfig::new(name, LOW, HIGH);
    cfg.output_dir = output_dir.to_path_buf();
    cfg.frame_width = 4;
    cfg.frame_height = 4;
    cfg.max_retries = 2;
    cfg.recording_window = Duration::from_millis(300);
    cfg.timing.ingest_interval = Duration::from_millis(2);
    cfg.timing.reconnect_backoff = Duration::from_millis(20);
    cfg.timing.retry_interval = Duration::from_millis(5);
    cfg.timing.poll_interval = Duration::from_millis(5);
    cfg.timing.close_timeout = Duration::from_millis(50);
    cfg.timing.health_log_interval = Duration::from_secs(1);
    cfg
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

pub fn spawn_session<C, S>(session: SessionCoordinator<C, S>) -> JoinHandle<Result<SessionReport>>
where
    C: SourceConnector + 'static,
    S: MediaSink + 'static,
{
    std::thread::spawn(move || session.run())
}

// ----------------------------------------------------------------------------
// Source
// ----------------------------------------------------------------------------

/// Connector whose sources produce tiny frames, or fail on demand.
///
/// `opened` lists every open attempt, failed ones included.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    pub opened: Arc<Mutex<Vec<String>>>,
    pub fail_reads: Arc<AtomicBool>,
    /// Number of upcoming opens that fail with `ConnectionFailed`.
    pub fail_opens: Arc<AtomicUsize>,
    pub good_reads: Arc<AtomicU64>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn good_reads_seen(&self) -> u64 {
        self.good_reads.load(Ordering::SeqCst)
    }

    pub fn fail_always(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.fail_reads.store(false, Ordering::SeqCst);
    }

    pub fn fail_next_opens(&self, count: usize) {
        self.fail_opens.store(count, Ordering::SeqCst);
    }
}

/// Decrement `counter` if it is non-zero. True when a unit was taken.
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl SourceConnector for ScriptedConnector {
    fn open(&mut self, address: &str) -> Result<Box<dyn FrameSource>, SourceError> {
        self.opened.lock().unwrap().push(address.to_string());
        if take_one(&self.fail_opens) {
            return Err(SourceError::connection(address, "scripted refusal"));
        }
        Ok(Box::new(ScriptedSource {
            address: Arc::from(address),
            sequence: 0,
            fail_reads: Arc::clone(&self.fail_reads),
            good_reads: Arc::clone(&self.good_reads),
        }))
    }
}

struct ScriptedSource {
    address: Arc<str>,
    sequence: u64,
    fail_reads: Arc<AtomicBool>,
    good_reads: Arc<AtomicU64>,
}

impl FrameSource for ScriptedSource {
    fn address(&self) -> &str {
        &self.address
    }

    fn read(&mut self) -> Result<Frame, SourceError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SourceError::ReadFailed("scripted failure".into()));
        }
        self.sequence += 1;
        self.good_reads.fetch_add(1, Ordering::SeqCst);
        Frame::new(vec![0u8; 4 * 4 * 3], 4, 4, self.sequence, Arc::clone(&self.address))
            .map_err(|e| SourceError::ReadFailed(e.to_string()))
    }

    fn close(&mut self, _timeout: Duration) -> Result<(), SourceError> {
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Detector
// ----------------------------------------------------------------------------

/// Fails once per unit in `failures`, then reports motion once per unit in `pending`.
#[derive(Clone, Default)]
pub struct ScriptedDetector {
    pub pending: Arc<AtomicUsize>,
    pub failures: Arc<AtomicUsize>,
    pub delay: Duration,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn fire(&self, times: usize) {
        self.pending.fetch_add(times, Ordering::SeqCst);
    }

    pub fn fail(&self, times: usize) {
        self.failures.fetch_add(times, Ordering::SeqCst);
    }

    pub fn boxed(&self) -> Box<dyn DetectorBackend> {
        Box::new(self.clone())
    }
}

impl DetectorBackend for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(
        &mut self,
        _pixels: &[u8],
        _width: u32,
        _height: u32,
    ) -> Result<DetectionResult, DetectionError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if take_one(&self.failures) {
            return Err(DetectionError::Failed("scripted failure".into()));
        }
        let fired = take_one(&self.pending);
        Ok(DetectionResult {
            motion_detected: fired,
            confidence: if fired { 1.0 } else { 0.0 },
            changed_fraction: if fired { 1.0 } else { 0.0 },
        })
    }
}

// ----------------------------------------------------------------------------
// Sink
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct RecordedFrame {
    pub sequence: u64,
    pub captured_at: Instant,
    pub origin: String,
}

#[derive(Clone, Debug)]
pub struct RecordedArtifact {
    pub path: PathBuf,
    pub created_at: Instant,
    pub frames: Vec<RecordedFrame>,
    pub closed: bool,
}

#[derive(Default)]
pub struct SinkLog {
    pub artifacts: Vec<RecordedArtifact>,
    pub open_now: usize,
    pub max_open: usize,
}

/// Keeps every artifact in memory and tracks how many are open at once.
#[derive(Clone, Default)]
pub struct MemorySink {
    pub log: Arc<Mutex<SinkLog>>,
    pub fail_create: Arc<AtomicBool>,
    /// Number of upcoming frame writes that fail with `WriteFailed`.
    pub fail_writes: Arc<AtomicUsize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artifacts(&self) -> Vec<RecordedArtifact> {
        self.log.lock().unwrap().artifacts.clone()
    }

    pub fn max_open(&self) -> usize {
        self.log.lock().unwrap().max_open
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.fail_writes.store(count, Ordering::SeqCst);
    }
}

impl MediaSink for MemorySink {
    fn create(
        &mut self,
        dir: &Path,
        device: &str,
        timestamp: DateTime<Local>,
    ) -> Result<Box<dyn MediaArtifact>, SinkError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(SinkError::CreateFailed {
                dir: dir.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "scripted"),
            });
        }
        let path = dir.join(format!("{}.mem", artifact_stem(device, timestamp)));
        let mut log = self.log.lock().unwrap();
        log.artifacts.push(RecordedArtifact {
            path: path.clone(),
            created_at: Instant::now(),
            frames: Vec::new(),
            closed: false,
        });
        log.open_now += 1;
        log.max_open = log.max_open.max(log.open_now);
        Ok(Box::new(MemoryArtifact {
            index: log.artifacts.len() - 1,
            path,
            log: Arc::clone(&self.log),
            fail_writes: Arc::clone(&self.fail_writes),
        }))
    }
}

struct MemoryArtifact {
    index: usize,
    path: PathBuf,
    log: Arc<Mutex<SinkLog>>,
    fail_writes: Arc<AtomicUsize>,
}

impl MediaArtifact for MemoryArtifact {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&mut self, frame: &Frame) -> Result<(), SinkError> {
        if take_one(&self.fail_writes) {
            return Err(SinkError::WriteFailed {
                path: self.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "scripted disk full"),
            });
        }
        let mut log = self.log.lock().unwrap();
        log.artifacts[self.index].frames.push(RecordedFrame {
            sequence: frame.sequence,
            captured_at: frame.captured_at,
            origin: frame.origin.to_string(),
        });
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<PathBuf, SinkError> {
        let mut log = self.log.lock().unwrap();
        log.artifacts[self.index].closed = true;
        log.open_now -= 1;
        Ok(self.path.clone())
    }
}
