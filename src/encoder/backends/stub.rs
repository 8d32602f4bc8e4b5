use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

use crate::convert::PlanarFrame;
use crate::encoder::backend::{CompressedUnit, EncoderSettings, VideoEncoder};

/// Unit header magic.
pub const STUB_UNIT_MAGIC: &[u8; 4] = b"FCST";

/// Encoded size of every stub unit: magic, pts, width, height, SHA-256 of the planes.
pub const STUB_UNIT_LEN: usize = 4 + 8 + 4 + 4 + 32;

/// Stub encoder for testing and codec-less runs.
///
/// Emits one fixed-size unit per submitted frame carrying the presentation
/// index and a digest of the planes. With a non-zero look-ahead it holds
/// units back until more than `lookahead` are queued, then releases them all
/// at once, the way a reordering encoder bursts.
pub struct StubEncoder {
    settings: EncoderSettings,
    lookahead: usize,
    queue: VecDeque<CompressedUnit>,
    releasing: bool,
    finished: bool,
}

impl StubEncoder {
    pub fn new(settings: EncoderSettings) -> Result<Self> {
        settings.validate()?;
        log::info!(
            "StubEncoder: {}x{} @ {} fps, gop {}",
            settings.width,
            settings.height,
            settings.fps,
            settings.gop_size
        );
        Ok(Self {
            settings,
            lookahead: 0,
            queue: VecDeque::new(),
            releasing: false,
            finished: false,
        })
    }

    pub fn with_lookahead(mut self, lookahead: usize) -> Self {
        self.lookahead = lookahead;
        self
    }

    fn encode_unit(&self, frame: &PlanarFrame) -> CompressedUnit {
        let mut hasher = Sha256::new();
        hasher.update(frame.y());
        hasher.update(frame.u());
        hasher.update(frame.v());
        let digest: [u8; 32] = hasher.finalize().into();

        let mut data = Vec::with_capacity(STUB_UNIT_LEN);
        data.extend_from_slice(STUB_UNIT_MAGIC);
        data.extend_from_slice(&frame.pts.to_be_bytes());
        data.extend_from_slice(&frame.width.to_be_bytes());
        data.extend_from_slice(&frame.height.to_be_bytes());
        data.extend_from_slice(&digest);

        CompressedUnit {
            data,
            pts: Some(frame.pts),
            keyframe: frame.pts % i64::from(self.settings.gop_size) == 0,
        }
    }
}

impl VideoEncoder for StubEncoder {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn submit(&mut self, frame: &PlanarFrame) -> Result<()> {
        if self.finished {
            return Err(anyhow!("stub encoder already finished"));
        }
        if frame.width != self.settings.width || frame.height != self.settings.height {
            return Err(anyhow!(
                "frame is {}x{}, stub encoder configured for {}x{}",
                frame.width,
                frame.height,
                self.settings.width,
                self.settings.height
            ));
        }
        let unit = self.encode_unit(frame);
        self.queue.push_back(unit);
        if self.queue.len() > self.lookahead {
            self.releasing = true;
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<Option<CompressedUnit>> {
        if !(self.releasing || self.finished) {
            return Ok(None);
        }
        let unit = self.queue.pop_front();
        if self.queue.is_empty() {
            self.releasing = false;
        }
        Ok(unit)
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

/// Decode the presentation index from a stub unit.
pub fn stub_unit_pts(data: &[u8]) -> Option<i64> {
    if data.len() != STUB_UNIT_LEN || &data[..4] != STUB_UNIT_MAGIC {
        return None;
    }
    let mut pts = [0u8; 8];
    pts.copy_from_slice(&data[4..12]);
    Some(i64::from_be_bytes(pts))
}
