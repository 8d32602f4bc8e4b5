//! framecast: live camera → H.264 → UDP streaming.
//!
//! # Architecture
//!
//! Two threads connected by a small bounded relay:
//!
//! 1. **Capture** pulls frames from a video source as fast as it delivers them
//!    and pushes each into the relay. It never waits on the encoder.
//! 2. **Encode-transmit** pops one frame at a time, converts it to I420,
//!    stamps a presentation index, submits it to the encoder, and sends every
//!    unit the encoder emits as UDP datagrams before popping again.
//!
//! When the encoder falls behind, the relay evicts its oldest frame, so
//! latency stays bounded at the cost of dropped frames.
//!
//! # Module Structure
//!
//! - `frame`: captured frames (`RawFrame`, `PixelFormat`)
//! - `relay`: bounded drop-oldest hand-off (`RelayBuffer`)
//! - `ingest`: frame sources (V4L2 devices, local files, synthetic pattern)
//! - `convert`: packed/semi-planar → I420 (`FrameConverter`, `PlanarFrame`)
//! - `encoder`: encoder contract and backends (FFmpeg H.264, stub)
//! - `transport`: datagram sinks and the oversize policy
//! - `capture` / `encode`: the two loops
//! - `pipeline`: thread wiring, stop and join
//! - `config`: JSON file + environment configuration

use std::fmt;

pub mod capture;
pub mod config;
pub mod convert;
pub mod encode;
pub mod encoder;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod relay;
pub mod stats;
pub mod transport;

pub use capture::{CaptureExit, CaptureLoop};
pub use config::{ConfigOverrides, EncoderKind, StreamConfig, VideoSettings};
pub use convert::{FrameConverter, PlanarFrame};
pub use encode::{EncodeTransmitLoop, FrameOutcome};
pub use encoder::{CompressedUnit, EncoderSettings, StubEncoder, VideoEncoder};
#[cfg(feature = "encode-ffmpeg")]
pub use encoder::FfmpegEncoder;
pub use frame::{PixelFormat, RawFrame};
pub use ingest::{open_source, Capture, SourceSettings, VideoSource};
pub use pipeline::{start, Pipeline, PipelineHandle, PipelineOptions, PipelineReport};
pub use relay::{RelayBuffer, DEFAULT_RELAY_CAPACITY};
pub use stats::{PipelineStats, StatsSnapshot};
pub use transport::{MemorySink, OversizePolicy, Transmitter, TransportSink, UdpSink};

/// Part of the pipeline that failed to come up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subsystem {
    Config,
    Source,
    Encoder,
    Transport,
    Pipeline,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Config => "config",
            Self::Source => "source",
            Self::Encoder => "encoder",
            Self::Transport => "transport",
            Self::Pipeline => "pipeline",
        };
        f.write_str(name)
    }
}

/// Startup failure. Nothing is running when this is returned.
#[derive(Debug)]
pub struct SetupError {
    pub subsystem: Subsystem,
    pub source: anyhow::Error,
}

impl SetupError {
    pub fn new(subsystem: Subsystem, source: anyhow::Error) -> Self {
        Self { subsystem, source }
    }
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} setup failed: {:#}", self.subsystem, self.source)
    }
}

impl std::error::Error for SetupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.source)
    }
}
