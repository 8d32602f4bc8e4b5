//! Thread wiring for one capture → relay → encode → transmit pipeline.

use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::capture::{CaptureExit, CaptureLoop};
use crate::config::{EncoderKind, StreamConfig};
use crate::convert::FrameConverter;
use crate::encode::EncodeTransmitLoop;
use crate::encoder::{EncoderSettings, StubEncoder, VideoEncoder};
use crate::frame::RawFrame;
use crate::ingest::{open_source, VideoSource};
use crate::relay::{RelayBuffer, DEFAULT_RELAY_CAPACITY};
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::transport::{
    OversizePolicy, Transmitter, TransportSink, UdpSink, DEFAULT_MAX_DATAGRAM,
};
use crate::{SetupError, Subsystem};

const CAPTURE_THREAD: &str = "framecast-capture";
const ENCODE_THREAD: &str = "framecast-encode";

/// Everything the pipeline needs besides its three endpoints.
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub relay_capacity: usize,
    /// Encoder resolution; captured frames must already match it.
    pub width: u32,
    pub height: u32,
    pub max_datagram: usize,
    pub oversize_policy: OversizePolicy,
    pub frame_limit: Option<u64>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            relay_capacity: DEFAULT_RELAY_CAPACITY,
            width: 500,
            height: 480,
            max_datagram: DEFAULT_MAX_DATAGRAM,
            oversize_policy: OversizePolicy::Split,
            frame_limit: None,
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            relay_capacity: config.relay_capacity,
            width: config.video.width,
            height: config.video.height,
            max_datagram: config.max_datagram,
            oversize_policy: config.oversize_policy,
            frame_limit: config.frame_limit,
        }
    }
}

/// How a pipeline ended.
#[derive(Clone, Debug)]
pub struct PipelineReport {
    pub capture_exit: CaptureExit,
    pub stats: StatsSnapshot,
}

pub struct Pipeline;

impl Pipeline {
    /// Start the capture and encode threads.
    ///
    /// `source` must already be connected. Ownership of each endpoint moves to
    /// the thread that drives it.
    pub fn spawn<S, E, T>(
        source: S,
        encoder: E,
        sink: T,
        options: &PipelineOptions,
    ) -> Result<PipelineHandle>
    where
        S: VideoSource + 'static,
        E: VideoEncoder + 'static,
        T: TransportSink + 'static,
    {
        let relay = Arc::new(RelayBuffer::<RawFrame>::new(options.relay_capacity)?);
        let converter = FrameConverter::new(options.width, options.height)?;
        let transmitter = Transmitter::new(sink, options.max_datagram, options.oversize_policy)?;
        let stop = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(PipelineStats::new());

        let mut encode_loop = EncodeTransmitLoop::new(
            Arc::clone(&relay),
            converter,
            encoder,
            transmitter,
            Arc::clone(&stop),
            Arc::clone(&stats),
        );
        let encode = thread::Builder::new()
            .name(ENCODE_THREAD.to_string())
            .spawn(move || encode_loop.run())
            .context("spawn encode thread")?;

        let mut capture_loop = CaptureLoop::new(
            source,
            Arc::clone(&relay),
            Arc::clone(&stop),
            Arc::clone(&stats),
        );
        if let Some(limit) = options.frame_limit {
            capture_loop = capture_loop.with_frame_limit(limit);
        }
        let capture = match thread::Builder::new()
            .name(CAPTURE_THREAD.to_string())
            .spawn(move || capture_loop.run())
        {
            Ok(capture) => capture,
            Err(err) => {
                stop.store(true, Ordering::SeqCst);
                relay.close();
                let _ = encode.join();
                return Err(anyhow::Error::new(err).context("spawn capture thread"));
            }
        };

        log::info!(
            "Pipeline: started ({}x{}, relay capacity {})",
            options.width,
            options.height,
            options.relay_capacity
        );
        Ok(PipelineHandle {
            stop,
            relay,
            stats,
            capture: Some(capture),
            encode: Some(encode),
        })
    }
}

/// Running pipeline. Dropping the handle stops and joins both threads.
pub struct PipelineHandle {
    stop: Arc<AtomicBool>,
    relay: Arc<RelayBuffer<RawFrame>>,
    stats: Arc<PipelineStats>,
    capture: Option<JoinHandle<CaptureExit>>,
    encode: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    pub fn stats(&self) -> StatsSnapshot {
        let mut snapshot = self.stats.snapshot();
        snapshot.relay_depth = self.relay.len();
        snapshot.relay_dropped = self.relay.dropped();
        snapshot
    }

    /// True once both threads have returned.
    pub fn is_finished(&self) -> bool {
        let done = |handle: Option<bool>| handle.unwrap_or(true);
        done(self.capture.as_ref().map(JoinHandle::is_finished))
            && done(self.encode.as_ref().map(JoinHandle::is_finished))
    }

    /// Ask both loops to end without waiting for them.
    ///
    /// Frames still queued in the relay are abandoned; the encoder is flushed.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.relay.close();
    }

    pub fn stop(self) -> Result<PipelineReport> {
        self.request_stop();
        self.join()
    }

    /// Wait for both threads to end on their own (end of stream, frame limit,
    /// source failure) or after `request_stop`.
    pub fn join(mut self) -> Result<PipelineReport> {
        let capture_exit = match self.capture.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("capture thread panicked"))?,
            None => CaptureExit::Stopped,
        };
        if let Some(handle) = self.encode.take() {
            handle
                .join()
                .map_err(|_| anyhow!("encode thread panicked"))?;
        }
        let stats = self.stats();
        log::info!(
            "Pipeline: stopped ({:?}); {} captured, {} relay drops, {} submitted, {} units sent",
            capture_exit,
            stats.frames_captured,
            stats.relay_dropped,
            stats.frames_submitted,
            stats.units_sent
        );
        Ok(PipelineReport {
            capture_exit,
            stats,
        })
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        if self.capture.is_none() && self.encode.is_none() {
            return;
        }
        self.request_stop();
        if let Some(handle) = self.capture.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.encode.take() {
            let _ = handle.join();
        }
    }
}

/// Construct the encoder selected by `kind`.
pub fn build_encoder(kind: EncoderKind, settings: EncoderSettings) -> Result<Box<dyn VideoEncoder>> {
    match kind {
        EncoderKind::Stub => Ok(Box::new(StubEncoder::new(settings)?)),
        #[cfg(feature = "encode-ffmpeg")]
        EncoderKind::Ffmpeg => Ok(Box::new(crate::encoder::FfmpegEncoder::new(settings)?)),
        #[cfg(not(feature = "encode-ffmpeg"))]
        EncoderKind::Ffmpeg => Err(anyhow!(
            "ffmpeg encoder requires the encode-ffmpeg feature"
        )),
    }
}

/// Open every endpoint named by `config` and start the pipeline.
///
/// Fails before any thread starts if an endpoint cannot be set up.
pub fn start(config: &StreamConfig) -> Result<PipelineHandle, SetupError> {
    config
        .validate()
        .map_err(|err| SetupError::new(Subsystem::Config, err))?;
    let destination = config
        .resolve_destination()
        .map_err(|err| SetupError::new(Subsystem::Config, err))?;

    let source_settings = config.source_settings();
    let mut source =
        open_source(&source_settings).map_err(|err| SetupError::new(Subsystem::Source, err))?;
    source
        .connect()
        .with_context(|| format!("open source {}", source_settings.uri))
        .map_err(|err| SetupError::new(Subsystem::Source, err))?;

    let encoder = build_encoder(config.encoder, config.encoder_settings())
        .map_err(|err| SetupError::new(Subsystem::Encoder, err))?;
    let sink =
        UdpSink::connect(destination).map_err(|err| SetupError::new(Subsystem::Transport, err))?;

    Pipeline::spawn(source, encoder, sink, &PipelineOptions::from_config(config))
        .map_err(|err| SetupError::new(Subsystem::Pipeline, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::stub_unit_pts;
    use crate::ingest::{SyntheticConfig, SyntheticSource};
    use crate::transport::MemorySink;
    use std::time::Duration;

    fn options(capacity: usize) -> PipelineOptions {
        PipelineOptions {
            relay_capacity: capacity,
            width: 16,
            height: 8,
            ..PipelineOptions::default()
        }
    }

    fn source(frames: Option<u64>, fps: u32) -> SyntheticSource {
        SyntheticSource::new(SyntheticConfig {
            width: 16,
            height: 8,
            target_fps: fps,
            frame_limit: frames,
            ..SyntheticConfig::default()
        })
    }

    fn encoder() -> StubEncoder {
        StubEncoder::new(EncoderSettings {
            width: 16,
            height: 8,
            ..EncoderSettings::default()
        })
        .unwrap()
    }

    #[test]
    fn every_frame_is_sent_when_the_relay_never_fills() -> Result<()> {
        let sink = MemorySink::new();
        let handle = Pipeline::spawn(source(Some(8), 0), encoder(), sink.clone(), &options(16))?;
        let report = handle.join()?;

        assert_eq!(report.capture_exit, CaptureExit::EndOfStream);
        assert_eq!(report.stats.frames_captured, 8);
        assert_eq!(report.stats.units_sent, 8);
        let pts: Vec<_> = sink.datagrams().iter().filter_map(|d| stub_unit_pts(d)).collect();
        assert_eq!(pts, (0..8).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn captured_frames_are_either_encoded_or_evicted() -> Result<()> {
        let sink = MemorySink::new();
        let handle = Pipeline::spawn(source(Some(200), 0), encoder(), sink.clone(), &options(2))?;
        let report = handle.join()?;

        let stats = report.stats;
        assert_eq!(stats.frames_captured, 200);
        assert_eq!(stats.frames_submitted + stats.relay_dropped, 200);
        assert_eq!(stats.units_sent, stats.frames_submitted);
        assert_eq!(stats.relay_depth, 0);

        let pts: Vec<_> = sink.datagrams().iter().filter_map(|d| stub_unit_pts(d)).collect();
        assert_eq!(pts, (0..stats.frames_submitted as i64).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn frame_limit_ends_an_endless_source() -> Result<()> {
        let mut opts = options(4);
        opts.frame_limit = Some(5);
        let handle = Pipeline::spawn(source(None, 0), encoder(), MemorySink::new(), &opts)?;
        let report = handle.join()?;
        assert_eq!(report.capture_exit, CaptureExit::FrameLimit);
        assert_eq!(report.stats.frames_captured, 5);
        Ok(())
    }

    #[test]
    fn stop_ends_a_live_pipeline() -> Result<()> {
        let handle = Pipeline::spawn(source(None, 60), encoder(), MemorySink::new(), &options(4))?;
        std::thread::sleep(Duration::from_millis(100));
        assert!(!handle.is_finished());
        let report = handle.stop()?;
        assert_eq!(report.capture_exit, CaptureExit::Stopped);
        Ok(())
    }

    #[test]
    fn bad_options_fail_before_spawning() {
        let mut opts = options(0);
        assert!(Pipeline::spawn(source(Some(1), 0), encoder(), MemorySink::new(), &opts).is_err());
        opts = options(4);
        opts.width = 15;
        assert!(Pipeline::spawn(source(Some(1), 0), encoder(), MemorySink::new(), &opts).is_err());
    }

    #[cfg(not(feature = "encode-ffmpeg"))]
    #[test]
    fn ffmpeg_kind_needs_the_feature() {
        assert!(build_encoder(EncoderKind::Ffmpeg, EncoderSettings::default()).is_err());
    }

    #[test]
    fn stub_kind_builds() -> Result<()> {
        let encoder = build_encoder(EncoderKind::Stub, EncoderSettings::default())?;
        assert_eq!(encoder.name(), "stub");
        Ok(())
    }
}
