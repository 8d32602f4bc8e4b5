//! Video encoders.
//!
//! - `VideoEncoder`: the submit/drain contract the encode loop drives.
//! - `StubEncoder`: digest-only units, no codec dependency.
//! - `FfmpegEncoder`: H.264 through FFmpeg (feature: encode-ffmpeg).

mod backend;
mod backends;

pub use backend::{CompressedUnit, EncoderSettings, VideoEncoder};
pub use backends::stub::{stub_unit_pts, STUB_UNIT_LEN, STUB_UNIT_MAGIC};
#[cfg(feature = "encode-ffmpeg")]
pub use backends::FfmpegEncoder;
pub use backends::StubEncoder;
