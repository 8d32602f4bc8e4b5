//! Capture loop: source → relay.
//!
//! Pulls frames as fast as the source delivers them and pushes every one into
//! the relay without looking at its occupancy. The relay's drop-oldest policy
//! absorbs any backlog, so this loop never waits on the encoder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::frame::RawFrame;
use crate::ingest::{Capture, VideoSource};
use crate::relay::RelayBuffer;
use crate::stats::PipelineStats;

/// Why the capture loop ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureExit {
    /// The source reported it has no more frames.
    EndOfStream,
    /// A terminal source failure, e.g. the device went away.
    SourceError(String),
    /// Operator stop.
    Stopped,
    /// The configured frame limit was reached.
    FrameLimit,
}

pub struct CaptureLoop<S> {
    source: S,
    relay: Arc<RelayBuffer<RawFrame>>,
    stop: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
    frame_limit: Option<u64>,
    pushed: u64,
}

impl<S: VideoSource> CaptureLoop<S> {
    /// `source` must already be connected.
    pub fn new(
        source: S,
        relay: Arc<RelayBuffer<RawFrame>>,
        stop: Arc<AtomicBool>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            source,
            relay,
            stop,
            stats,
            frame_limit: None,
            pushed: 0,
        }
    }

    /// End the loop after `limit` frames have been pushed.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    /// Run until end-of-stream, a source failure, the frame limit or a stop request.
    ///
    /// The relay is closed on exit so the consumer drains what is queued and ends.
    pub fn run(mut self) -> CaptureExit {
        let exit = self.capture_until_exit();
        self.relay.close();

        let stats = self.source.stats();
        match &exit {
            CaptureExit::SourceError(err) => log::warn!(
                "capture: {} failed after {} frames: {}",
                stats.source,
                self.pushed,
                err
            ),
            other => log::info!(
                "capture: {} ended ({:?}) after {} frames",
                stats.source,
                other,
                self.pushed
            ),
        }
        exit
    }

    fn capture_until_exit(&mut self) -> CaptureExit {
        loop {
            if self.stop.load(Ordering::SeqCst) {
                return CaptureExit::Stopped;
            }
            if self.frame_limit.is_some_and(|limit| self.pushed >= limit) {
                return CaptureExit::FrameLimit;
            }

            let next = self.source.next_frame();
            self.stats
                .source_healthy
                .store(self.source.is_healthy(), Ordering::Relaxed);
            match next {
                Ok(Capture::Frame(frame)) => {
                    self.relay.push(frame);
                    self.pushed += 1;
                    PipelineStats::bump(&self.stats.frames_captured, 1);
                }
                Ok(Capture::Gap) => {
                    log::trace!("capture: transient gap from source");
                    PipelineStats::bump(&self.stats.capture_gaps, 1);
                }
                Ok(Capture::EndOfStream) => return CaptureExit::EndOfStream,
                Err(err) => return CaptureExit::SourceError(format!("{:#}", err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use crate::ingest::SourceStats;
    use anyhow::{anyhow, Result};
    use std::collections::VecDeque;

    /// Replays a script of capture results; an exhausted script is end-of-stream.
    /// Reports unhealthy once it has delivered a gap.
    struct ScriptedSource {
        script: VecDeque<Result<Capture>>,
        delivered: u64,
        gapped: bool,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Capture>>) -> Self {
            Self {
                script: script.into(),
                delivered: 0,
                gapped: false,
            }
        }
    }

    impl VideoSource for ScriptedSource {
        fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Capture> {
            let next = self.script.pop_front().unwrap_or(Ok(Capture::EndOfStream));
            match next {
                Ok(Capture::Frame(_)) => self.delivered += 1,
                Ok(Capture::Gap) => self.gapped = true,
                _ => {}
            }
            next
        }

        fn is_healthy(&self) -> bool {
            !self.gapped
        }

        fn stats(&self) -> SourceStats {
            SourceStats {
                frames_captured: self.delivered,
                source: "scripted".to_string(),
            }
        }
    }

    fn frame(sequence: u64) -> Result<Capture> {
        Ok(Capture::Frame(RawFrame::new(
            vec![sequence as u8; 12],
            2,
            2,
            PixelFormat::Bgr24,
            sequence,
        )))
    }

    fn harness(capacity: usize) -> (Arc<RelayBuffer<RawFrame>>, Arc<AtomicBool>, Arc<PipelineStats>) {
        (
            Arc::new(RelayBuffer::new(capacity).unwrap()),
            Arc::new(AtomicBool::new(false)),
            Arc::new(PipelineStats::new()),
        )
    }

    fn sequences(relay: &RelayBuffer<RawFrame>) -> Vec<u64> {
        std::iter::from_fn(|| relay.pop()).map(|f| f.sequence).collect()
    }

    #[test]
    fn pushes_every_frame_then_closes_on_end_of_stream() {
        let (relay, stop, stats) = harness(8);
        let source = ScriptedSource::new(vec![frame(1), frame(2), frame(3)]);
        let exit = CaptureLoop::new(source, Arc::clone(&relay), stop, Arc::clone(&stats)).run();

        assert_eq!(exit, CaptureExit::EndOfStream);
        assert!(relay.is_closed());
        assert_eq!(sequences(&relay), vec![1, 2, 3]);
        assert_eq!(stats.snapshot().frames_captured, 3);
    }

    #[test]
    fn never_blocks_on_a_full_relay() {
        let (relay, stop, stats) = harness(2);
        let source = ScriptedSource::new((1..=6).map(frame).collect());
        let exit = CaptureLoop::new(source, Arc::clone(&relay), stop, stats).run();

        assert_eq!(exit, CaptureExit::EndOfStream);
        assert_eq!(relay.dropped(), 4);
        assert_eq!(sequences(&relay), vec![5, 6]);
    }

    #[test]
    fn gaps_are_skipped_and_counted() {
        let (relay, stop, stats) = harness(8);
        let source = ScriptedSource::new(vec![frame(1), Ok(Capture::Gap), frame(2)]);
        CaptureLoop::new(source, Arc::clone(&relay), stop, Arc::clone(&stats)).run();

        assert_eq!(sequences(&relay), vec![1, 2]);
        assert_eq!(stats.snapshot().capture_gaps, 1);
    }

    #[test]
    fn source_health_is_published_after_each_read() {
        let (relay, stop, stats) = harness(8);
        let source = ScriptedSource::new(vec![frame(1), frame(2)]);
        CaptureLoop::new(source, relay, stop, Arc::clone(&stats)).run();
        assert!(stats.snapshot().source_healthy);

        let (relay, stop, stats) = harness(8);
        let source = ScriptedSource::new(vec![frame(1), Ok(Capture::Gap), frame(2)]);
        CaptureLoop::new(source, relay, stop, Arc::clone(&stats)).run();
        assert!(!stats.snapshot().source_healthy);
    }

    #[test]
    fn source_failure_ends_capture() {
        let (relay, stop, stats) = harness(8);
        let source = ScriptedSource::new(vec![frame(1), Err(anyhow!("device unplugged")), frame(2)]);
        let exit = CaptureLoop::new(source, Arc::clone(&relay), stop, stats).run();

        assert_eq!(exit, CaptureExit::SourceError("device unplugged".to_string()));
        assert_eq!(sequences(&relay), vec![1]);
    }

    #[test]
    fn stop_request_ends_capture_before_next_read() {
        let (relay, stop, stats) = harness(8);
        stop.store(true, Ordering::SeqCst);
        let source = ScriptedSource::new(vec![frame(1)]);
        let exit = CaptureLoop::new(source, Arc::clone(&relay), stop, stats).run();

        assert_eq!(exit, CaptureExit::Stopped);
        assert!(relay.is_empty());
        assert!(relay.is_closed());
    }

    #[test]
    fn frame_limit_ends_capture() {
        let (relay, stop, stats) = harness(8);
        let source = ScriptedSource::new((1..=5).map(frame).collect());
        let exit = CaptureLoop::new(source, Arc::clone(&relay), stop, stats)
            .with_frame_limit(2)
            .run();

        assert_eq!(exit, CaptureExit::FrameLimit);
        assert_eq!(sequences(&relay), vec![1, 2]);
    }
}
