use anyhow::{anyhow, Result};
use std::fmt;

use crate::convert::PlanarFrame;

/// Encoder configuration, fixed for the lifetime of the encoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    /// Frame rate; the time base is `1/fps`.
    pub fps: u32,
    pub bitrate_bps: u64,
    /// Distance between keyframes. 1 makes every unit independently decodable.
    pub gop_size: u32,
    pub max_b_frames: u32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            width: 500,
            height: 480,
            fps: 30,
            bitrate_bps: 800_000,
            gop_size: 1,
            max_b_frames: 0,
        }
    }
}

impl EncoderSettings {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!("encoder dimensions must be non-zero"));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(anyhow!(
                "encoder dimensions must be even for 4:2:0, got {}x{}",
                self.width,
                self.height
            ));
        }
        if self.fps == 0 {
            return Err(anyhow!("encoder fps must be greater than zero"));
        }
        if self.bitrate_bps == 0 {
            return Err(anyhow!("encoder bitrate must be greater than zero"));
        }
        if self.gop_size == 0 {
            return Err(anyhow!("encoder gop size must be greater than zero"));
        }
        Ok(())
    }
}

/// One discrete encoder output, ready for transmission.
#[derive(Clone, PartialEq, Eq)]
pub struct CompressedUnit {
    pub data: Vec<u8>,
    /// Presentation index of the frame the unit belongs to, when the encoder reports it.
    pub pts: Option<i64>,
    pub keyframe: bool,
}

impl fmt::Debug for CompressedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressedUnit")
            .field("bytes", &self.data.len())
            .field("pts", &self.pts)
            .field("keyframe", &self.keyframe)
            .finish()
    }
}

/// Stateful video encoder.
///
/// Frames must be submitted in presentation order. An encoder may buffer
/// internally, so a submit can yield zero, one or several units; callers
/// drain until `drain` returns `Ok(None)` before submitting again.
pub trait VideoEncoder: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Hand a stamped I420 frame to the encoder. An `Err` means the frame was rejected.
    fn submit(&mut self, frame: &PlanarFrame) -> Result<()>;

    /// Next finished unit, or `None` when nothing is available right now.
    fn drain(&mut self) -> Result<Option<CompressedUnit>>;

    /// Signal end of input so buffered units become drainable.
    fn finish(&mut self) -> Result<()>;
}

impl<E: VideoEncoder + ?Sized> VideoEncoder for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn submit(&mut self, frame: &PlanarFrame) -> Result<()> {
        (**self).submit(frame)
    }

    fn drain(&mut self) -> Result<Option<CompressedUnit>> {
        (**self).drain()
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_intra_only() {
        let settings = EncoderSettings::default();
        assert_eq!(settings.gop_size, 1);
        assert_eq!(settings.max_b_frames, 0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let odd = EncoderSettings {
            width: 501,
            ..EncoderSettings::default()
        };
        assert!(odd.validate().is_err());

        let no_fps = EncoderSettings {
            fps: 0,
            ..EncoderSettings::default()
        };
        assert!(no_fps.validate().is_err());
    }
}
