//! RTSP frame sources.
//!
//! `RtspConnector` opens `stub://` addresses as synthetic scenes and everything
//! else through GStreamer (`rtspsrc ! decodebin ! videoconvert ! appsink`).
//! Without the `rtsp-gstreamer` feature, real addresses fail to connect, which the
//! stream reader treats like any other connection failure.

#[cfg(feature = "rtsp-gstreamer")]
use std::sync::Arc;
#[cfg(feature = "rtsp-gstreamer")]
use std::time::{Duration, Instant};

use super::synthetic::{SyntheticConfig, SyntheticSource};
use super::{FrameSource, SourceConnector};
use crate::error::SourceError;
#[cfg(feature = "rtsp-gstreamer")]
use crate::frame::Frame;

/// Connector for camera stream addresses.
#[derive(Clone, Debug)]
pub struct RtspConnector {
    /// Dimensions of synthetic frames.
    pub synthetic: SyntheticConfig,
    /// Expected frame rate; bounds how long a read may stall.
    pub target_fps: u32,
}

impl Default for RtspConnector {
    fn default() -> Self {
        Self {
            synthetic: SyntheticConfig::default(),
            target_fps: 10,
        }
    }
}

impl RtspConnector {
    pub fn new(target_fps: u32) -> Self {
        Self {
            target_fps,
            ..Self::default()
        }
    }
}

impl SourceConnector for RtspConnector {
    fn open(&mut self, address: &str) -> Result<Box<dyn FrameSource>, SourceError> {
        if address.starts_with("stub://") {
            return Ok(Box::new(SyntheticSource::new(
                address,
                self.synthetic.clone(),
            )));
        }
        #[cfg(feature = "rtsp-gstreamer")]
        {
            let source = GstreamerRtspSource::open(address, self.target_fps)?;
            Ok(Box::new(source))
        }
        #[cfg(not(feature = "rtsp-gstreamer"))]
        {
            Err(SourceError::connection(
                address,
                "RTSP requires the rtsp-gstreamer feature",
            ))
        }
    }
}

// ----------------------------------------------------------------------------
// Production RTSP source using GStreamer
// ----------------------------------------------------------------------------

#[cfg(feature = "rtsp-gstreamer")]
struct GstreamerRtspSource {
    address: Arc<str>,
    target_fps: u32,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    frame_count: u64,
    last_error: Option<String>,
    released: bool,
}

#[cfg(feature = "rtsp-gstreamer")]
impl GstreamerRtspSource {
    fn open(address: &str, target_fps: u32) -> Result<Self, SourceError> {
        use gstreamer::prelude::*;

        gstreamer::init().map_err(|e| SourceError::connection(address, e))?;

        let pipeline_description = format!(
            "rtspsrc location={} latency=0 ! decodebin ! videoconvert ! video/x-raw,format=RGB ! \
             appsink name=appsink sync=false max-buffers=1 drop=true",
            address
        );
        let pipeline = gstreamer::parse::launch(&pipeline_description)
            .map_err(|e| SourceError::connection(address, e))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| SourceError::connection(address, "RTSP pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .ok_or_else(|| SourceError::connection(address, "appsink element missing"))?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| SourceError::connection(address, "appsink has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_max_buffers(1);
        appsink.set_drop(true);
        appsink.set_sync(false);

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| SourceError::connection(address, e))?;
        log::info!("RtspSource: connected to {}", address);

        Ok(Self {
            address: Arc::from(address),
            target_fps,
            pipeline,
            appsink,
            frame_count: 0,
            last_error: None,
            released: false,
        })
    }

    fn frame_timeout(&self) -> Duration {
        let base_ms = if self.target_fps == 0 {
            500
        } else {
            (1000 / self.target_fps).saturating_mul(4)
        };
        Duration::from_millis(base_ms.max(500) as u64)
    }

    fn poll_bus(&mut self) {
        use gstreamer::prelude::*;

        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        while let Some(message) = bus.timed_pop(gstreamer::ClockTime::ZERO) {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    self.last_error = Some(format!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    ));
                }
                MessageView::Eos(..) => {
                    self.last_error = Some("gstreamer reached EOS".to_string());
                }
                _ => {}
            }
        }
    }

    fn release(&mut self, timeout: Duration) -> Result<(), SourceError> {
        use gstreamer::prelude::*;

        if self.released {
            return Ok(());
        }
        self.released = true;
        let started = Instant::now();
        let _ = self.pipeline.set_state(gstreamer::State::Null);
        let wait = gstreamer::ClockTime::from_mseconds(timeout.as_millis() as u64);
        let (result, current, _pending) = self.pipeline.state(wait);
        if result.is_err() || current != gstreamer::State::Null {
            return Err(SourceError::CloseTimedOut(timeout));
        }
        log::debug!(
            "RtspSource: released {} in {:?}",
            self.address,
            started.elapsed()
        );
        Ok(())
    }
}

#[cfg(feature = "rtsp-gstreamer")]
impl FrameSource for GstreamerRtspSource {
    fn address(&self) -> &str {
        &self.address
    }

    fn read(&mut self) -> Result<Frame, SourceError> {
        self.poll_bus();
        if let Some(err) = self.last_error.take() {
            return Err(SourceError::ReadFailed(err));
        }

        let timeout = gstreamer::ClockTime::from_mseconds(self.frame_timeout().as_millis() as u64);
        let sample = self
            .appsink
            .try_pull_sample(timeout)
            .ok_or_else(|| SourceError::ReadFailed("RTSP stream stalled".to_string()))?;

        let (pixels, width, height) =
            sample_to_pixels(&sample).map_err(|e| SourceError::ReadFailed(e.to_string()))?;
        self.frame_count += 1;

        Frame::new(
            pixels,
            width,
            height,
            self.frame_count,
            Arc::clone(&self.address),
        )
        .map_err(|e| SourceError::ReadFailed(e.to_string()))
    }

    fn close(&mut self, timeout: Duration) -> Result<(), SourceError> {
        self.release(timeout)
    }
}

#[cfg(feature = "rtsp-gstreamer")]
impl Drop for GstreamerRtspSource {
    fn drop(&mut self) {
        if let Err(e) = self.release(Duration::from_secs(1)) {
            log::warn!("RtspSource: {} on drop", e);
        }
    }
}

#[cfg(feature = "rtsp-gstreamer")]
fn sample_to_pixels(sample: &gstreamer::Sample) -> anyhow::Result<(Vec<u8>, u32, u32)> {
    use anyhow::Context;

    let buffer = sample.buffer().context("RTSP sample missing buffer")?;
    let caps = sample.caps().context("RTSP sample missing caps")?;
    let info =
        gstreamer_video::VideoInfo::from_caps(caps).context("parse RTSP caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().context("map RTSP buffer")?;
    let data = map.as_slice();

    if stride == row_bytes {
        let frame = data
            .get(..row_bytes * height as usize)
            .context("RTSP buffer shorter than frame")?;
        return Ok((frame.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("RTSP buffer row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
