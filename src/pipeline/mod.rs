//! The capture / detect / record pipeline.
//!
//! One session runs three workers on their own threads:
//!
//! ```text
//!   FrameSource -> StreamReader -+-> detection channel -> DetectorWorker
//!                                \-> recording channel -> RecordingWriter -> MediaSink
//! ```
//!
//! Workers share nothing but the two bounded channels and `SessionSignals`.

pub mod detector;
pub mod reader;
pub mod session;
pub mod writer;

pub use detector::{DetectorStats, DetectorWorker};
pub use reader::{ReaderStats, ResolutionMode, StreamReader};
pub use session::{SessionCoordinator, SessionReport, StopCause};
pub use writer::{RecordingWriter, WriterStats};
