//! Encode-transmit loop: relay → convert → stamp → encoder → transport.
//!
//! One iteration per popped frame, strictly sequential:
//! 1. pop (blocks while the relay is empty)
//! 2. discard empty frames without consuming a presentation index
//! 3. convert to I420 at the encoder resolution (no resizing)
//! 4. stamp the next presentation index
//! 5. submit; a rejected frame skips the drain step
//! 6. drain the encoder until it has nothing more, sending every unit
//!
//! The next pop only happens after step 6 has exhausted the encoder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::convert::FrameConverter;
use crate::encoder::{CompressedUnit, VideoEncoder};
use crate::frame::{PixelFormat, RawFrame};
use crate::relay::RelayBuffer;
use crate::stats::PipelineStats;
use crate::transport::{Transmitter, TransportSink};

/// What happened to one popped frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Empty or unconvertible; no index consumed.
    Skipped,
    /// Stamped but refused by the encoder; nothing drained.
    Rejected { pts: i64 },
    /// Submitted and drained; `units` were produced by this drain.
    Encoded { pts: i64, units: u64 },
}

pub struct EncodeTransmitLoop<E, S> {
    relay: Arc<RelayBuffer<RawFrame>>,
    converter: FrameConverter,
    encoder: E,
    transmitter: Transmitter<S>,
    stop: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
    next_pts: i64,
    last_unconvertible: Option<(u32, u32, PixelFormat)>,
}

impl<E: VideoEncoder, S: TransportSink> EncodeTransmitLoop<E, S> {
    pub fn new(
        relay: Arc<RelayBuffer<RawFrame>>,
        converter: FrameConverter,
        encoder: E,
        transmitter: Transmitter<S>,
        stop: Arc<AtomicBool>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            relay,
            converter,
            encoder,
            transmitter,
            stop,
            stats,
            next_pts: 0,
            last_unconvertible: None,
        }
    }

    /// Process frames until the relay is closed and drained or a stop is requested,
    /// then flush the encoder and send what it still holds.
    pub fn run(&mut self) {
        log::info!(
            "encode: {} encoder, {}x{}, datagram limit {} bytes",
            self.encoder.name(),
            self.converter.width(),
            self.converter.height(),
            self.transmitter.max_datagram()
        );
        loop {
            if self.stop.load(Ordering::SeqCst) {
                log::info!("encode: stop requested");
                break;
            }
            let Some(frame) = self.relay.pop() else {
                log::info!("encode: relay closed");
                break;
            };
            self.process_frame(frame);
        }
        self.flush();
        log::info!("encode: finished, {} frames stamped", self.next_pts);
    }

    /// Run one iteration for an already-popped frame.
    pub fn process_frame(&mut self, frame: RawFrame) -> FrameOutcome {
        if frame.is_empty() {
            log::trace!("encode: skipping empty frame");
            PipelineStats::bump(&self.stats.frames_skipped, 1);
            return FrameOutcome::Skipped;
        }

        let mut planar = match self.converter.convert(&frame) {
            Ok(planar) => planar,
            Err(err) => {
                self.note_unconvertible(&frame, &err);
                PipelineStats::bump(&self.stats.frames_skipped, 1);
                return FrameOutcome::Skipped;
            }
        };
        drop(frame);

        let pts = self.next_pts;
        planar.pts = pts;
        self.next_pts += 1;

        if let Err(err) = self.encoder.submit(&planar) {
            log::debug!("encode: frame {} rejected by encoder: {:#}", pts, err);
            PipelineStats::bump(&self.stats.frames_rejected, 1);
            return FrameOutcome::Rejected { pts };
        }
        PipelineStats::bump(&self.stats.frames_submitted, 1);

        let units = self.drain_encoder();
        FrameOutcome::Encoded { pts, units }
    }

    /// Index the next accepted frame will be stamped with.
    pub fn next_presentation_index(&self) -> i64 {
        self.next_pts
    }

    fn drain_encoder(&mut self) -> u64 {
        let mut units = 0;
        loop {
            match self.encoder.drain() {
                Ok(Some(unit)) => {
                    units += 1;
                    self.send_unit(unit);
                }
                Ok(None) => break,
                Err(err) => {
                    log::warn!("encode: drain failed: {:#}", err);
                    break;
                }
            }
        }
        units
    }

    // The unit is released as soon as its bytes have been handed to the sink.
    fn send_unit(&mut self, unit: CompressedUnit) {
        let outcome = self.transmitter.transmit(&unit.data);
        if outcome.datagrams_sent > 0 {
            PipelineStats::bump(&self.stats.units_sent, 1);
        }
        if outcome.dropped_oversize {
            PipelineStats::bump(&self.stats.units_dropped_oversize, 1);
        }
        PipelineStats::bump(&self.stats.datagrams_sent, outcome.datagrams_sent);
        PipelineStats::bump(&self.stats.send_failures, outcome.send_failures);
    }

    fn flush(&mut self) {
        match self.encoder.finish() {
            Ok(()) => {
                let units = self.drain_encoder();
                if units > 0 {
                    log::debug!("encode: flushed {} buffered units", units);
                }
            }
            Err(err) => log::warn!("encode: encoder flush failed: {:#}", err),
        }
    }

    fn note_unconvertible(&mut self, frame: &RawFrame, err: &anyhow::Error) {
        let geometry = (frame.width, frame.height, frame.format);
        if self.last_unconvertible == Some(geometry) {
            log::trace!("encode: skipping unconvertible frame: {:#}", err);
        } else {
            log::warn!("encode: skipping unconvertible frame: {:#}", err);
            self.last_unconvertible = Some(geometry);
        }
    }
}
