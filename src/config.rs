use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::str::FromStr;

use crate::encoder::EncoderSettings;
use crate::ingest::SourceSettings;
use crate::relay::DEFAULT_RELAY_CAPACITY;
use crate::transport::{OversizePolicy, DEFAULT_MAX_DATAGRAM, MAX_UDP_PAYLOAD};

const DEFAULT_SOURCE: &str = "/dev/video0";
const DEFAULT_DESTINATION: &str = "127.0.0.1:5000";
const DEFAULT_WIDTH: u32 = 500;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 30;
const DEFAULT_BITRATE_BPS: u64 = 800_000;
const DEFAULT_GOP_SIZE: u32 = 1;
const DEFAULT_BUFFER_DEPTH: u32 = 1;

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    source: Option<SourceConfigFile>,
    video: Option<VideoConfigFile>,
    encoder: Option<EncoderKind>,
    relay: Option<RelayConfigFile>,
    transport: Option<TransportConfigFile>,
    frame_limit: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    uri: Option<String>,
    buffer_depth: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct VideoConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    bitrate: Option<u64>,
    gop: Option<u32>,
    max_b_frames: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct RelayConfigFile {
    capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct TransportConfigFile {
    destination: Option<String>,
    max_datagram: Option<usize>,
    oversize: Option<OversizePolicy>,
}

/// Which encoder backend to drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    Ffmpeg,
    Stub,
}

impl Default for EncoderKind {
    fn default() -> Self {
        if cfg!(feature = "encode-ffmpeg") {
            Self::Ffmpeg
        } else {
            Self::Stub
        }
    }
}

impl FromStr for EncoderKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ffmpeg" | "h264" => Ok(Self::Ffmpeg),
            "stub" => Ok(Self::Stub),
            other => Err(anyhow!("unknown encoder '{}'", other)),
        }
    }
}

/// Command-line values layered over the file and environment.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub source: Option<String>,
    pub destination: Option<String>,
    pub frame_limit: Option<u64>,
    pub encoder: Option<EncoderKind>,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub source: String,
    pub buffer_depth: u32,
    /// `host:port`; resolved once at startup.
    pub destination: String,
    pub video: VideoSettings,
    pub encoder: EncoderKind,
    pub relay_capacity: usize,
    pub max_datagram: usize,
    pub oversize_policy: OversizePolicy,
    /// Stop capturing after this many frames.
    pub frame_limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_bps: u64,
    pub gop_size: u32,
    pub max_b_frames: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::from_file(StreamConfigFile::default())
    }
}

impl StreamConfig {
    /// Load from `path` (or `FRAMECAST_CONFIG` when `path` is `None`), apply
    /// environment overrides, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("FRAMECAST_CONFIG")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => match env_path.as_deref() {
                Some(path) => Some(read_config_file(Path::new(path))?),
                None => None,
            },
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: StreamConfigFile) -> Self {
        let source = file.source.unwrap_or_default();
        let video = file.video.unwrap_or_default();
        let relay = file.relay.unwrap_or_default();
        let transport = file.transport.unwrap_or_default();
        Self {
            source: source.uri.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            buffer_depth: source.buffer_depth.unwrap_or(DEFAULT_BUFFER_DEPTH),
            destination: transport
                .destination
                .unwrap_or_else(|| DEFAULT_DESTINATION.to_string()),
            video: VideoSettings {
                width: video.width.unwrap_or(DEFAULT_WIDTH),
                height: video.height.unwrap_or(DEFAULT_HEIGHT),
                fps: video.fps.unwrap_or(DEFAULT_FPS),
                bitrate_bps: video.bitrate.unwrap_or(DEFAULT_BITRATE_BPS),
                gop_size: video.gop.unwrap_or(DEFAULT_GOP_SIZE),
                max_b_frames: video.max_b_frames.unwrap_or(0),
            },
            encoder: file.encoder.unwrap_or_default(),
            relay_capacity: relay.capacity.unwrap_or(DEFAULT_RELAY_CAPACITY),
            max_datagram: transport.max_datagram.unwrap_or(DEFAULT_MAX_DATAGRAM),
            oversize_policy: transport.oversize.unwrap_or_default(),
            frame_limit: file.frame_limit,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(source) = env_string("FRAMECAST_SOURCE") {
            self.source = source;
        }
        if let Some(destination) = env_string("FRAMECAST_DESTINATION") {
            self.destination = destination;
        }
        if let Some(encoder) = env_parse("FRAMECAST_ENCODER")? {
            self.encoder = encoder;
        }
        if let Some(width) = env_parse("FRAMECAST_WIDTH")? {
            self.video.width = width;
        }
        if let Some(height) = env_parse("FRAMECAST_HEIGHT")? {
            self.video.height = height;
        }
        if let Some(fps) = env_parse("FRAMECAST_FPS")? {
            self.video.fps = fps;
        }
        if let Some(bitrate) = env_parse("FRAMECAST_BITRATE")? {
            self.video.bitrate_bps = bitrate;
        }
        if let Some(capacity) = env_parse("FRAMECAST_RELAY_CAPACITY")? {
            self.relay_capacity = capacity;
        }
        if let Some(max_datagram) = env_parse("FRAMECAST_MAX_DATAGRAM")? {
            self.max_datagram = max_datagram;
        }
        if let Some(policy) = env_parse("FRAMECAST_OVERSIZE")? {
            self.oversize_policy = policy;
        }
        Ok(())
    }

    /// Apply flag values over whatever `load` produced, then re-validate.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) -> Result<()> {
        if let Some(source) = overrides.source {
            self.source = source;
        }
        if let Some(destination) = overrides.destination {
            self.destination = destination;
        }
        if let Some(frames) = overrides.frame_limit {
            self.frame_limit = Some(frames);
        }
        if let Some(encoder) = overrides.encoder {
            self.encoder = encoder;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(anyhow!("source must not be empty"));
        }
        if self.destination.trim().is_empty() {
            return Err(anyhow!("destination must not be empty"));
        }
        if self.buffer_depth == 0 {
            return Err(anyhow!("source buffer depth must be greater than zero"));
        }
        if self.relay_capacity == 0 {
            return Err(anyhow!("relay capacity must be greater than zero"));
        }
        if self.max_datagram == 0 || self.max_datagram > MAX_UDP_PAYLOAD {
            return Err(anyhow!(
                "max datagram must be within 1..={}, got {}",
                MAX_UDP_PAYLOAD,
                self.max_datagram
            ));
        }
        if self.frame_limit == Some(0) {
            return Err(anyhow!("frame limit must be greater than zero"));
        }
        self.encoder_settings().validate()
    }

    /// Resolve `destination` to the first address it names.
    pub fn resolve_destination(&self) -> Result<SocketAddr> {
        self.destination
            .to_socket_addrs()
            .with_context(|| format!("resolve destination '{}'", self.destination))?
            .next()
            .ok_or_else(|| anyhow!("destination '{}' resolved to no address", self.destination))
    }

    pub fn source_settings(&self) -> SourceSettings {
        SourceSettings {
            uri: self.source.clone(),
            width: self.video.width,
            height: self.video.height,
            target_fps: self.video.fps,
            buffer_depth: self.buffer_depth,
        }
    }

    pub fn encoder_settings(&self) -> EncoderSettings {
        EncoderSettings {
            width: self.video.width,
            height: self.video.height,
            fps: self.video.fps,
            bitrate_bps: self.video.bitrate_bps,
            gop_size: self.video.gop_size,
            max_b_frames: self.video.max_b_frames,
        }
    }
}

fn read_config_file(path: &Path) -> Result<StreamConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("{} has invalid value '{}': {}", key, value, e)),
        None => Ok(None),
    }
}
