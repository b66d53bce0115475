//! Cross-worker control signals for one camera session.
//!
//! Every field has exactly one writer role:
//!
//! | signal              | set by                       | cleared by        |
//! |---------------------|------------------------------|-------------------|
//! | `stop`              | coordinator / `StopHandle`   | never             |
//! | `request_high_res`  | detector worker              | stream reader     |
//! | `request_low_res`   | recording writer             | stream reader     |
//! | `recording_active`  | recording writer             | recording writer  |
//! | `start_recording`   | detector worker              | recording writer  |
//!
//! All other access is read-only. Atomics are the only synchronization needed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest single sleep slice while waiting on `stop`.
const STOP_POLL_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
pub struct SessionSignals {
    stop: AtomicBool,
    request_high_res: AtomicBool,
    request_low_res: AtomicBool,
    recording_active: AtomicBool,
    start_recording: AtomicBool,
}

impl SessionSignals {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // -- stop ---------------------------------------------------------------

    /// Set `stop`. Returns true only for the call that actually flipped it.
    pub fn request_stop(&self) -> bool {
        !self.stop.swap(true, Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless `stop` is set first. Returns true if stopped.
    pub fn sleep_unless_stopped(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(STOP_POLL_SLICE));
        }
    }

    // -- resolution requests ------------------------------------------------

    pub fn request_high_res(&self) {
        self.request_high_res.store(true, Ordering::SeqCst);
    }

    pub fn request_low_res(&self) {
        self.request_low_res.store(true, Ordering::SeqCst);
    }

    /// Reader side: consume both pending requests as `(high, low)`.
    pub fn take_resolution_requests(&self) -> (bool, bool) {
        (
            self.request_high_res.swap(false, Ordering::SeqCst),
            self.request_low_res.swap(false, Ordering::SeqCst),
        )
    }

    // -- recording ----------------------------------------------------------

    pub fn recording_active(&self) -> bool {
        self.recording_active.load(Ordering::SeqCst)
    }

    pub(crate) fn set_recording_active(&self, active: bool) {
        self.recording_active.store(active, Ordering::SeqCst);
    }

    /// Detector side: raise the one-shot trigger. False if one was already pending.
    pub fn raise_recording_trigger(&self) -> bool {
        self.start_recording
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn recording_trigger_pending(&self) -> bool {
        self.start_recording.load(Ordering::SeqCst)
    }

    /// Writer side: consume the one-shot trigger.
    pub(crate) fn take_recording_trigger(&self) -> bool {
        self.start_recording.swap(false, Ordering::SeqCst)
    }
}

/// Cloneable handle for stopping a session from outside (e.g. a Ctrl-C handler).
#[derive(Clone, Debug)]
pub struct StopHandle {
    signals: Arc<SessionSignals>,
}

impl StopHandle {
    pub(crate) fn new(signals: Arc<SessionSignals>) -> Self {
        Self { signals }
    }

    /// Idempotent; safe to call from any thread at any time.
    pub fn request_stop(&self) {
        if self.signals.request_stop() {
            log::info!("session stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.signals.is_stopped()
    }
}
