//! Frame ingestion sources.
//!
//! The pipeline only ever talks to the two traits below:
//! - `SourceConnector` opens a source at an address (low- or high-resolution stream)
//! - `FrameSource` yields frames until it fails or is closed
//!
//! Provided implementations:
//! - `stub://` synthetic scenes (testing, demos)
//! - RTSP streams via GStreamer (feature: rtsp-gstreamer)
//!
//! Sources never touch the disk. Transport and decoding stay behind these traits.

use std::time::Duration;

use crate::error::SourceError;
use crate::frame::Frame;

pub mod rtsp;
pub mod synthetic;

pub use rtsp::RtspConnector;
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// An open frame source. Exclusively owned by the stream reader.
pub trait FrameSource: Send {
    /// Address this source was opened at.
    fn address(&self) -> &str;

    /// Read the next frame.
    fn read(&mut self) -> Result<Frame, SourceError>;

    /// Release the underlying handle, blocking at most `timeout`.
    ///
    /// Returns `SourceError::CloseTimedOut` if the release did not complete in time.
    fn close(&mut self, timeout: Duration) -> Result<(), SourceError>;
}

/// Opens frame sources at stream addresses.
pub trait SourceConnector: Send {
    fn open(&mut self, address: &str) -> Result<Box<dyn FrameSource>, SourceError>;
}

impl<F> SourceConnector for F
where
    F: FnMut(&str) -> Result<Box<dyn FrameSource>, SourceError> + Send,
{
    fn open(&mut self, address: &str) -> Result<Box<dyn FrameSource>, SourceError> {
        self(address)
    }
}
