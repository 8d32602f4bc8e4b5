use anyhow::{anyhow, Result};

use crate::frame::{PixelFormat, RawFrame};

/// Planar I420 frame handed to encoders.
///
/// `pts` is the presentation index stamped by the encode loop; it is 0 until then.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanarFrame {
    pub width: u32,
    pub height: u32,
    pub pts: i64,
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
}

impl PlanarFrame {
    pub fn y(&self) -> &[u8] {
        &self.y
    }

    pub fn u(&self) -> &[u8] {
        &self.u
    }

    pub fn v(&self) -> &[u8] {
        &self.v
    }
}

/// Converts captured frames to I420 at a fixed resolution. Never resizes.
#[derive(Clone, Copy, Debug)]
pub struct FrameConverter {
    width: u32,
    height: u32,
}

impl FrameConverter {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(anyhow!(
                "I420 output requires non-zero even dimensions, got {}x{}",
                width,
                height
            ));
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn convert(&self, frame: &RawFrame) -> Result<PlanarFrame> {
        if frame.width != self.width || frame.height != self.height {
            return Err(anyhow!(
                "frame is {}x{}, encoder expects {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            ));
        }
        let expected = frame.format.frame_len(frame.width, frame.height)?;
        if frame.byte_len() != expected {
            return Err(anyhow!(
                "{:?} frame length mismatch: expected {}, got {}",
                frame.format,
                expected,
                frame.byte_len()
            ));
        }

        let w = self.width as usize;
        let h = self.height as usize;
        let pixels = frame.data();
        let (y, u, v) = match frame.format {
            PixelFormat::Bgr24 => packed_rgb_to_i420(pixels, w, h, [2, 1, 0]),
            PixelFormat::Rgb24 => packed_rgb_to_i420(pixels, w, h, [0, 1, 2]),
            PixelFormat::Yuyv => yuyv_to_i420(pixels, w, h),
            PixelFormat::Nv12 => nv12_to_i420(pixels, w, h),
        };

        Ok(PlanarFrame {
            width: self.width,
            height: self.height,
            pts: 0,
            y,
            u,
            v,
        })
    }
}

type Planes = (Vec<u8>, Vec<u8>, Vec<u8>);

/// BT.601 limited range. `order` gives the byte offsets of R, G and B.
fn packed_rgb_to_i420(pixels: &[u8], w: usize, h: usize, order: [usize; 3]) -> Planes {
    let [ro, go, bo] = order;
    let rgb_at = |row: usize, col: usize| {
        let offset = (row * w + col) * 3;
        (
            pixels[offset + ro] as i32,
            pixels[offset + go] as i32,
            pixels[offset + bo] as i32,
        )
    };

    let mut y = vec![0u8; w * h];
    for row in 0..h {
        for col in 0..w {
            let (r, g, b) = rgb_at(row, col);
            y[row * w + col] = luma(r, g, b);
        }
    }

    let (cw, ch) = (w / 2, h / 2);
    let mut u = vec![0u8; cw * ch];
    let mut v = vec![0u8; cw * ch];
    for row in 0..ch {
        for col in 0..cw {
            let (mut r, mut g, mut b) = (0, 0, 0);
            for (dr, dc) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                let (pr, pg, pb) = rgb_at(row * 2 + dr, col * 2 + dc);
                r += pr;
                g += pg;
                b += pb;
            }
            let (r, g, b) = ((r + 2) / 4, (g + 2) / 4, (b + 2) / 4);
            u[row * cw + col] = clamp_to_u8(((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128);
            v[row * cw + col] = clamp_to_u8(((112 * r - 94 * g - 18 * b + 128) >> 8) + 128);
        }
    }

    (y, u, v)
}

fn luma(r: i32, g: i32, b: i32) -> u8 {
    clamp_to_u8(((66 * r + 129 * g + 25 * b + 128) >> 8) + 16)
}

fn yuyv_to_i420(pixels: &[u8], w: usize, h: usize) -> Planes {
    let mut y = vec![0u8; w * h];
    for (dst, src) in y.iter_mut().zip(pixels.iter().step_by(2)) {
        *dst = *src;
    }

    let (cw, ch) = (w / 2, h / 2);
    let mut u = vec![0u8; cw * ch];
    let mut v = vec![0u8; cw * ch];
    let stride = w * 2;
    for row in 0..ch {
        let top = row * 2 * stride;
        let bottom = top + stride;
        for col in 0..cw {
            let macro_px = col * 4;
            let avg = |off: usize| {
                ((pixels[top + macro_px + off] as u16 + pixels[bottom + macro_px + off] as u16 + 1)
                    / 2) as u8
            };
            u[row * cw + col] = avg(1);
            v[row * cw + col] = avg(3);
        }
    }

    (y, u, v)
}

fn nv12_to_i420(pixels: &[u8], w: usize, h: usize) -> Planes {
    let (y_plane, uv_plane) = pixels.split_at(w * h);
    let mut u = Vec::with_capacity(uv_plane.len() / 2);
    let mut v = Vec::with_capacity(uv_plane.len() / 2);
    for pair in uv_plane.chunks_exact(2) {
        u.push(pair[0]);
        v.push(pair[1]);
    }
    (y_plane.to_vec(), u, v)
}

fn clamp_to_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}
