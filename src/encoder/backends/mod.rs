pub mod stub;

#[cfg(feature = "encode-ffmpeg")]
pub mod ffmpeg;

pub use stub::StubEncoder;

#[cfg(feature = "encode-ffmpeg")]
pub use self::ffmpeg::FfmpegEncoder;
