//! Local file frame source using FFmpeg.
//!
//! Decodes the best video stream of a local file to BGR24 in-memory. The end
//! of the file is reported as `Capture::EndOfStream` once the decoder has been
//! drained.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use std::time::{Duration, Instant};

use super::{Capture, SourceStats, VideoSource};
use crate::frame::{PixelFormat, RawFrame};

pub struct FileSource {
    path: String,
    target_fps: u32,
    decoder: Option<FileDecoder>,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
}

struct FileDecoder {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    eof_sent: bool,
}

// FFmpeg contexts are used from one thread at a time: the one owning the source.
unsafe impl Send for FileDecoder {}

impl FileSource {
    pub fn new(path: &str, target_fps: u32) -> Self {
        Self {
            path: path.to_string(),
            target_fps,
            decoder: None,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    fn pace(&mut self) {
        if self.target_fps == 0 {
            return;
        }
        let interval = Duration::from_secs(1) / self.target_fps;
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
    }
}

impl FileDecoder {
    fn open(path: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open file input '{}' with ffmpeg", path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::BGR24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            eof_sent: false,
        })
    }

    /// Next decoded frame as packed BGR24, or `None` at end of file.
    fn next_pixels(&mut self) -> Result<Option<(Vec<u8>, u32, u32)>> {
        let mut decoded = ffmpeg::frame::Video::empty();

        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                let mut bgr_frame = ffmpeg::frame::Video::empty();
                self.scaler
                    .run(&decoded, &mut bgr_frame)
                    .context("scale frame to BGR")?;
                return frame_to_pixels(&bgr_frame).map(Some);
            }
            if self.eof_sent {
                return Ok(None);
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    self.decoder
                        .send_packet(&packet)
                        .context("send packet to ffmpeg decoder")?;
                }
                Err(ffmpeg::Error::Eof) => {
                    self.decoder.send_eof().context("flush ffmpeg decoder")?;
                    self.eof_sent = true;
                }
                Err(err) => return Err(anyhow::Error::new(err).context("read file packet")),
            }
        }
    }
}

impl VideoSource for FileSource {
    fn connect(&mut self) -> Result<()> {
        let decoder = FileDecoder::open(&self.path).map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;
        log::info!(
            "FileSource: connected to {} ({}x{}, ffmpeg)",
            self.path,
            decoder.decoder.width(),
            decoder.decoder.height()
        );
        self.decoder = Some(decoder);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Capture> {
        self.pace();
        let decoder = self.decoder.as_mut().context("file source not connected")?;
        let Some((pixels, width, height)) = decoder.next_pixels().map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?
        else {
            log::info!(
                "FileSource: end of {} after {} frames",
                self.path,
                self.frame_count
            );
            return Ok(Capture::EndOfStream);
        };

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Ok(Capture::Frame(RawFrame::new(
            pixels,
            width,
            height,
            PixelFormat::Bgr24,
            self.frame_count,
        )))
    }

    fn is_healthy(&self) -> bool {
        self.last_error.is_none()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.path.clone(),
        }
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data[..row_bytes * height as usize].to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_fails_to_connect() {
        let mut source = FileSource::new("/nonexistent/clip.mp4", 0);
        assert!(source.connect().is_err());
        assert!(!source.is_healthy());
    }

    #[test]
    fn next_frame_requires_connect() {
        let mut source = FileSource::new("/nonexistent/clip.mp4", 0);
        assert!(source.next_frame().is_err());
    }
}
