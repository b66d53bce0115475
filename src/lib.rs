//! IP camera recorder
//!
//! Watches a camera's low-resolution stream for motion and, when something shows
//! up, switches the camera to its high-resolution stream and records a bounded
//! window to disk before switching back.
//!
//! # Architecture
//!
//! Each camera runs one session made of three workers:
//!
//! 1. **StreamReader**: owns the frame source, reconnects forever, fans frames out
//!    to two bounded lossy channels, and reopens the source on resolution requests.
//! 2. **DetectorWorker**: runs a detector backend and raises the recording trigger
//!    plus the high-resolution request.
//! 3. **RecordingWriter**: owns the media sink, keeps at most one recording window
//!    open, and requests low resolution again when the window closes.
//!
//! The `SessionCoordinator` wires them together, enforces the session duration,
//! and joins every worker on stop.
//!
//! # Module Structure
//!
//! - `config`: immutable per-camera settings and the file/env loader
//! - `frame`: decoded frames
//! - `signals`: cross-worker control flags
//! - `channel`: bounded lossy frame queues
//! - `ingest`: frame sources (synthetic, RTSP)
//! - `detect`: detector backends
//! - `media`: recording sinks
//! - `pipeline`: the workers and the coordinator

pub mod channel;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod media;
pub mod pipeline;
pub mod signals;

pub use channel::{FrameChannel, Pop, DEFAULT_CHANNEL_CAPACITY};
pub use config::{
    CameraConfig, CameraEndpoint, PipelineTiming, RecorderConfig, RetriggerPolicy,
    SessionDuration,
};
pub use detect::{backend_by_name, DetectionResult, DetectorBackend, MotionBackend};
pub use error::{DetectionError, SinkError, SourceError};
pub use frame::Frame;
pub use ingest::{FrameSource, RtspConnector, SourceConnector};
pub use media::{MediaArtifact, MediaSink, RawFileSink};
pub use pipeline::{SessionCoordinator, SessionReport, StopCause};
pub use signals::{SessionSignals, StopHandle};
