//! Raw frame container.
//!
//! - `RawFrame`: owned interleaved (or semi-planar) pixel data as delivered by a source.
//! - `PixelFormat`: the layouts sources are allowed to hand over.
//!
//! A `RawFrame` is immutable once captured. Sources copy pixels out of any
//! driver-owned storage before constructing one, so the relay buffer always
//! owns an independent copy.

use anyhow::{anyhow, Result};
use std::fmt;

/// Pixel layouts accepted from capture sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// Interleaved 8-bit B, G, R.
    Bgr24,
    /// Interleaved 8-bit R, G, B.
    Rgb24,
    /// Packed 4:2:2, Y0 U Y1 V.
    Yuyv,
    /// Semi-planar 4:2:0, Y plane followed by interleaved UV.
    Nv12,
}

impl PixelFormat {
    /// Map a V4L2 fourcc to a supported layout.
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"BGR3" => Some(Self::Bgr24),
            b"RGB3" => Some(Self::Rgb24),
            b"YUYV" => Some(Self::Yuyv),
            b"NV12" => Some(Self::Nv12),
            _ => None,
        }
    }

    /// Exact byte length of a tightly packed frame in this layout.
    pub fn frame_len(self, width: u32, height: u32) -> Result<usize> {
        let pixels = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        let len = match self {
            Self::Bgr24 | Self::Rgb24 => pixels.checked_mul(3),
            Self::Yuyv => pixels.checked_mul(2),
            Self::Nv12 => pixels.checked_add(pixels / 2),
        };
        len.ok_or_else(|| anyhow!("frame dimensions overflow"))
    }
}

/// A captured frame.
///
/// Pixel bytes are private; `Debug` reports only geometry and length.
#[derive(Clone)]
pub struct RawFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Capture order assigned by the source, starting at 1.
    pub sequence: u64,
}

impl RawFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat, sequence: u64) -> Self {
        Self {
            data,
            width,
            height,
            format,
            sequence,
        }
    }

    /// A frame with no pixels. Consumers skip these.
    pub fn empty() -> Self {
        Self::new(Vec::new(), 0, 0, PixelFormat::Bgr24, 0)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() || self.width == 0 || self.height == 0
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_frame_is_empty() {
        assert!(RawFrame::empty().is_empty());
        let zero_width = RawFrame::new(vec![1, 2, 3], 0, 1, PixelFormat::Rgb24, 1);
        assert!(zero_width.is_empty());
    }

    #[test]
    fn frame_len_matches_layout() -> Result<()> {
        assert_eq!(PixelFormat::Bgr24.frame_len(4, 2)?, 24);
        assert_eq!(PixelFormat::Yuyv.frame_len(4, 2)?, 16);
        assert_eq!(PixelFormat::Nv12.frame_len(4, 2)?, 12);
        Ok(())
    }

    #[test]
    fn debug_does_not_print_pixels() {
        let frame = RawFrame::new(vec![0xAB; 12], 2, 2, PixelFormat::Bgr24, 7);
        let rendered = format!("{:?}", frame);
        assert!(rendered.contains("bytes: 12"));
        assert!(!rendered.contains("171"));
    }

    #[test]
    fn fourcc_mapping() {
        assert_eq!(PixelFormat::from_fourcc(b"BGR3"), Some(PixelFormat::Bgr24));
        assert_eq!(PixelFormat::from_fourcc(b"MJPG"), None);
    }
}
