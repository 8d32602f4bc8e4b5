//! Frame capture sources.
//!
//! This module provides the sources the capture loop can pull from:
//! - USB/V4L2 devices (feature: ingest-v4l2)
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic test pattern (`stub://` URIs)
//!
//! Every source hands over owned `RawFrame`s. Pixels are copied out of any
//! driver-owned storage before the frame leaves the source.

#[cfg(feature = "ingest-file-ffmpeg")]
pub mod file;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};

use crate::frame::RawFrame;

#[cfg(feature = "ingest-file-ffmpeg")]
pub use file::FileSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

/// Result of one capture attempt.
#[derive(Debug)]
pub enum Capture {
    Frame(RawFrame),
    /// The source produced nothing usable this time but is still open.
    Gap,
    /// The source is exhausted or closed.
    EndOfStream,
}

/// A blocking frame source.
///
/// `next_frame` blocks until a frame is ready. An `Err` is a terminal source failure.
pub trait VideoSource: Send {
    /// Open the device or input. Called once before the first `next_frame`.
    fn connect(&mut self) -> Result<()>;

    fn next_frame(&mut self) -> Result<Capture>;

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats;
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<Capture> {
        (**self).next_frame()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// Statistics for a source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Settings shared by every source backend.
#[derive(Clone, Debug)]
pub struct SourceSettings {
    /// `stub://name`, `/dev/videoN`, `v4l2:///dev/videoN`, `file:///path` or a bare file path.
    pub uri: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    /// Driver-side buffer count. 1 keeps capture latency minimal.
    pub buffer_depth: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            uri: "/dev/video0".to_string(),
            width: 500,
            height: 480,
            target_fps: 30,
            buffer_depth: 1,
        }
    }
}

/// Select and construct a source backend for `settings.uri`.
///
/// The returned source is not yet connected.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn VideoSource>> {
    let uri = settings.uri.trim();
    if uri.is_empty() {
        return Err(anyhow!("source uri must not be empty"));
    }

    if let Some(rest) = uri.strip_prefix("stub://") {
        let config = SyntheticConfig::from_uri_tail(rest, settings)?;
        return Ok(Box::new(SyntheticSource::new(config)));
    }

    if let Some(device) = v4l2_device_path(uri) {
        #[cfg(feature = "ingest-v4l2")]
        {
            let config = V4l2Config {
                device: device.to_string(),
                target_fps: settings.target_fps,
                width: settings.width,
                height: settings.height,
                buffer_depth: settings.buffer_depth,
            };
            return Ok(Box::new(V4l2Source::new(config)));
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            return Err(anyhow!(
                "capture device {} requires the ingest-v4l2 feature",
                device
            ));
        }
    }

    let path = uri.strip_prefix("file://").unwrap_or(uri);
    if path.contains("://") {
        return Err(anyhow!("unsupported source uri scheme: {}", uri));
    }
    open_file(path, settings)
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_file(path: &str, settings: &SourceSettings) -> Result<Box<dyn VideoSource>> {
    Ok(Box::new(FileSource::new(path, settings.target_fps)))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_file(path: &str, _settings: &SourceSettings) -> Result<Box<dyn VideoSource>> {
    Err(anyhow!(
        "file input {} requires the ingest-file-ffmpeg feature",
        path
    ))
}

fn v4l2_device_path(uri: &str) -> Option<&str> {
    if let Some(device) = uri.strip_prefix("v4l2://") {
        return Some(device);
    }
    uri.starts_with("/dev/video").then_some(uri)
}
