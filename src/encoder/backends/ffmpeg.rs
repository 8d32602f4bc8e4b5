use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use crate::convert::PlanarFrame;
use crate::encoder::backend::{CompressedUnit, EncoderSettings, VideoEncoder};

/// H.264 encoder backed by FFmpeg (libx264 or whatever H.264 encoder FFmpeg resolves).
///
/// Configured for live streaming: every frame is a keyframe by default, no
/// B-frames, zero-latency tuning.
pub struct FfmpegEncoder {
    settings: EncoderSettings,
    encoder: ffmpeg::encoder::video::Encoder,
}

// The codec context is only driven from the encode thread that owns it.
unsafe impl Send for FfmpegEncoder {}

impl FfmpegEncoder {
    pub fn new(settings: EncoderSettings) -> Result<Self> {
        settings.validate()?;
        ffmpeg::init().context("initialize ffmpeg")?;

        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::H264)
            .ok_or_else(|| anyhow!("H.264 encoder not found"))?;
        let mut video = ffmpeg::codec::context::Context::new()
            .encoder()
            .video()
            .context("allocate ffmpeg video encoder")?;

        let fps = i32::try_from(settings.fps).context("fps out of range")?;
        video.set_width(settings.width);
        video.set_height(settings.height);
        video.set_format(ffmpeg::format::Pixel::YUV420P);
        video.set_time_base((1, fps));
        video.set_frame_rate(Some((fps, 1)));
        video.set_bit_rate(usize::try_from(settings.bitrate_bps).context("bitrate out of range")?);
        video.set_gop(settings.gop_size);
        video.set_max_b_frames(settings.max_b_frames as usize);

        let mut options = ffmpeg::Dictionary::new();
        options.set("preset", "ultrafast");
        options.set("tune", "zerolatency");

        let encoder = video
            .open_as_with(codec, options)
            .context("open H.264 encoder")?;

        log::info!(
            "FfmpegEncoder: opened {} {}x{} @ {} fps, {} bps, gop {}",
            codec.name(),
            settings.width,
            settings.height,
            settings.fps,
            settings.bitrate_bps,
            settings.gop_size
        );

        Ok(Self { settings, encoder })
    }

    fn to_ffmpeg_frame(&self, frame: &PlanarFrame) -> ffmpeg::frame::Video {
        let mut out = ffmpeg::frame::Video::new(
            ffmpeg::format::Pixel::YUV420P,
            self.settings.width,
            self.settings.height,
        );
        let width = self.settings.width as usize;
        let height = self.settings.height as usize;
        let planes = [
            (frame.y(), width, height),
            (frame.u(), width / 2, height / 2),
            (frame.v(), width / 2, height / 2),
        ];
        for (index, (src, row_bytes, rows)) in planes.into_iter().enumerate() {
            let stride = out.stride(index);
            let dst = out.data_mut(index);
            for row in 0..rows {
                dst[row * stride..row * stride + row_bytes]
                    .copy_from_slice(&src[row * row_bytes..(row + 1) * row_bytes]);
            }
        }
        out.set_pts(Some(frame.pts));
        out
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn name(&self) -> &'static str {
        "ffmpeg-h264"
    }

    fn submit(&mut self, frame: &PlanarFrame) -> Result<()> {
        if frame.width != self.settings.width || frame.height != self.settings.height {
            return Err(anyhow!(
                "frame is {}x{}, encoder configured for {}x{}",
                frame.width,
                frame.height,
                self.settings.width,
                self.settings.height
            ));
        }
        // A fresh frame per submit: the encoder may keep a reference to the previous one.
        let av_frame = self.to_ffmpeg_frame(frame);
        self.encoder
            .send_frame(&av_frame)
            .context("send frame to H.264 encoder")
    }

    fn drain(&mut self) -> Result<Option<CompressedUnit>> {
        let mut packet = ffmpeg::Packet::empty();
        match self.encoder.receive_packet(&mut packet) {
            Ok(()) => Ok(Some(CompressedUnit {
                data: packet.data().map(<[u8]>::to_vec).unwrap_or_default(),
                pts: packet.pts(),
                keyframe: packet.is_key(),
            })),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => {
                Ok(None)
            }
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(err) => Err(anyhow::Error::new(err).context("receive H.264 packet")),
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.encoder.send_eof().context("flush H.264 encoder")
    }
}
