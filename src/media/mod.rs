//! Recording sinks.
//!
//! A `MediaSink` creates one artifact per recording window. The artifact is
//! exclusively owned by the recording writer until it is closed.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::SinkError;
use crate::frame::Frame;

pub mod raw;

pub use raw::{read_raw_artifact, RawFileSink, RawFrameRecord};

/// An open recording artifact.
pub trait MediaArtifact: Send {
    /// Where the artifact is being written.
    fn path(&self) -> &Path;

    fn write(&mut self, frame: &Frame) -> Result<(), SinkError>;

    /// Flush and release. Consumes the artifact.
    fn close(self: Box<Self>) -> Result<PathBuf, SinkError>;
}

/// Creates recording artifacts.
pub trait MediaSink: Send {
    /// Open a new artifact under `dir`, named from `device` and `timestamp`.
    ///
    /// Creates `dir` if it does not exist.
    fn create(
        &mut self,
        dir: &Path,
        device: &str,
        timestamp: DateTime<Local>,
    ) -> Result<Box<dyn MediaArtifact>, SinkError>;
}

/// Deterministic artifact stem: `<device>_<YYYYmmdd_HHMMSS>`.
pub fn artifact_stem(device: &str, timestamp: DateTime<Local>) -> String {
    format!("{}_{}", device, timestamp.format("%Y%m%d_%H%M%S"))
}
