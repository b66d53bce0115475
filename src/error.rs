//! Error taxonomy for the external collaborators.
//!
//! None of these errors terminate a session. Source errors trigger a reconnect,
//! detection errors skip a frame, and sink errors abandon the current recording
//! window only.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by a frame source or its connector.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("connection to {address} failed: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("frame read failed: {0}")]
    ReadFailed(String),

    #[error("source did not release within {0:?}")]
    CloseTimedOut(Duration),
}

impl SourceError {
    pub fn connection(address: &str, reason: impl ToString) -> Self {
        Self::ConnectionFailed {
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Read and connection failures are handled identically by the reader.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::ReadFailed(_))
    }
}

/// Detector invocation failure. The frame is skipped.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("detection failed: {0}")]
    Failed(String),
}

/// Errors raised by a media sink or an open artifact.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to create artifact in {}: {source}", dir.display())]
    CreateFailed {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write frame to {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to close {}: {source}", path.display())]
    CloseFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
