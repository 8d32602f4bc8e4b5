//! Synthetic frame source (`stub://` URIs).
//!
//! Generates a moving BGR24 test pattern at the configured resolution. The
//! URI tail accepts query parameters for tests and smoke runs:
//! - `frames=N`: report end-of-stream after N frames
//! - `gap_every=K`: report a transient gap instead of every K-th frame
//! - `paced=false`: do not sleep to hold the target frame rate

use anyhow::{anyhow, Context, Result};
use std::time::{Duration, Instant};

use super::{Capture, SourceSettings, SourceStats, VideoSource};
use crate::frame::{PixelFormat, RawFrame};

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Frames per second to pace at. 0 disables pacing.
    pub target_fps: u32,
    pub frame_limit: Option<u64>,
    pub gap_every: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "camera".to_string(),
            width: 500,
            height: 480,
            target_fps: 0,
            frame_limit: None,
            gap_every: None,
        }
    }
}

impl SyntheticConfig {
    /// Parse the part of a `stub://` URI after the scheme.
    pub fn from_uri_tail(tail: &str, settings: &SourceSettings) -> Result<Self> {
        let (name, query) = match tail.split_once('?') {
            Some((name, query)) => (name, Some(query)),
            None => (tail, None),
        };
        let mut config = Self {
            name: name.to_string(),
            width: settings.width,
            height: settings.height,
            target_fps: settings.target_fps,
            frame_limit: None,
            gap_every: None,
        };

        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("stub source parameter '{}' has no value", pair))?;
            match key {
                "frames" => {
                    config.frame_limit = Some(
                        value
                            .parse()
                            .with_context(|| format!("invalid frames value '{}'", value))?,
                    )
                }
                "gap_every" => {
                    let every: u64 = value
                        .parse()
                        .with_context(|| format!("invalid gap_every value '{}'", value))?;
                    if every == 0 {
                        return Err(anyhow!("gap_every must be greater than zero"));
                    }
                    config.gap_every = Some(every);
                }
                "paced" => {
                    let paced: bool = value
                        .parse()
                        .with_context(|| format!("invalid paced value '{}'", value))?;
                    if !paced {
                        config.target_fps = 0;
                    }
                }
                other => return Err(anyhow!("unknown stub source parameter '{}'", other)),
            }
        }
        Ok(config)
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    attempts: u64,
    frame_count: u64,
    last_frame_at: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            attempts: 0,
            frame_count: 0,
            last_frame_at: None,
        }
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let width = self.config.width as usize;
        let pixel_count = width * self.config.height as usize * 3;
        let shift = self.frame_count as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, px) in pixels.chunks_exact_mut(3).enumerate() {
            let (x, y) = (i % width, i / width);
            px[0] = ((x + shift) % 256) as u8;
            px[1] = ((y + shift / 2) % 256) as u8;
            px[2] = ((x + y) % 256) as u8;
        }
        pixels
    }

    fn pace(&mut self) {
        if self.config.target_fps == 0 {
            return;
        }
        let interval = Duration::from_secs(1) / self.config.target_fps;
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }
}

impl VideoSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        log::info!(
            "SyntheticSource: connected to stub://{} ({}x{})",
            self.config.name,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Capture> {
        if let Some(limit) = self.config.frame_limit {
            if self.frame_count >= limit {
                return Ok(Capture::EndOfStream);
            }
        }
        self.pace();
        self.attempts += 1;
        if let Some(every) = self.config.gap_every {
            if self.attempts % every == 0 {
                return Ok(Capture::Gap);
            }
        }

        self.frame_count += 1;
        Ok(Capture::Frame(RawFrame::new(
            self.generate_pixels(),
            self.config.width,
            self.config.height,
            PixelFormat::Bgr24,
            self.frame_count,
        )))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: format!("stub://{}", self.config.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SyntheticConfig {
        SyntheticConfig {
            width: 4,
            height: 2,
            ..SyntheticConfig::default()
        }
    }

    #[test]
    fn produces_bgr_frames_at_configured_size() -> Result<()> {
        let mut source = SyntheticSource::new(small_config());
        source.connect()?;
        let Capture::Frame(frame) = source.next_frame()? else {
            panic!("expected a frame");
        };
        assert_eq!((frame.width, frame.height), (4, 2));
        assert_eq!(frame.format, PixelFormat::Bgr24);
        assert_eq!(frame.byte_len(), 24);
        assert_eq!(frame.sequence, 1);
        Ok(())
    }

    #[test]
    fn consecutive_frames_differ() -> Result<()> {
        let mut source = SyntheticSource::new(small_config());
        let (Capture::Frame(a), Capture::Frame(b)) = (source.next_frame()?, source.next_frame()?)
        else {
            panic!("expected frames");
        };
        assert_ne!(a.data(), b.data());
        Ok(())
    }

    #[test]
    fn gaps_do_not_consume_frame_numbers() -> Result<()> {
        let mut source = SyntheticSource::new(SyntheticConfig {
            gap_every: Some(2),
            frame_limit: Some(2),
            ..small_config()
        });
        assert!(matches!(source.next_frame()?, Capture::Frame(ref f) if f.sequence == 1));
        assert!(matches!(source.next_frame()?, Capture::Gap));
        assert!(matches!(source.next_frame()?, Capture::Frame(ref f) if f.sequence == 2));
        assert!(matches!(source.next_frame()?, Capture::EndOfStream));
        Ok(())
    }

    #[test]
    fn uri_parameters_are_parsed() -> Result<()> {
        let settings = SourceSettings {
            width: 16,
            height: 8,
            ..SourceSettings::default()
        };
        let config = SyntheticConfig::from_uri_tail("lab?frames=10&gap_every=3&paced=false", &settings)?;
        assert_eq!(config.name, "lab");
        assert_eq!(config.frame_limit, Some(10));
        assert_eq!(config.gap_every, Some(3));
        assert_eq!(config.target_fps, 0);
        assert_eq!((config.width, config.height), (16, 8));

        assert!(SyntheticConfig::from_uri_tail("lab?gap_every=0", &settings).is_err());
        assert!(SyntheticConfig::from_uri_tail("lab?color=red", &settings).is_err());
        Ok(())
    }
}
