//! framecastd - stream a camera to a UDP receiver as H.264
//!
//! Configuration comes from an optional JSON file, `FRAMECAST_*` environment
//! variables, then the flags below, in increasing precedence.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use framecast::{ConfigOverrides, EncoderKind, StreamConfig};

const HEALTH_INTERVAL: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(author, version, about = "Stream a live camera to a UDP receiver")]
struct Args {
    /// JSON config file.
    #[arg(long, env = "FRAMECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Source URI: /dev/videoN, v4l2:///dev/videoN, file:///path or stub://name.
    #[arg(long)]
    source: Option<String>,

    /// Receiver address (host:port).
    #[arg(long)]
    destination: Option<String>,

    /// Stop after this many captured frames.
    #[arg(long)]
    frames: Option<u64>,

    /// Encoder backend: ffmpeg or stub.
    #[arg(long)]
    encoder: Option<EncoderKind>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = StreamConfig::load(args.config.as_deref())?;
    cfg.apply_overrides(ConfigOverrides {
        source: args.source,
        destination: args.destination,
        frame_limit: args.frames,
        encoder: args.encoder,
    })?;

    log::info!(
        "framecastd {}: {} -> {} ({}x{} @ {} fps, {} bps, {:?} encoder)",
        env!("CARGO_PKG_VERSION"),
        cfg.source,
        cfg.destination,
        cfg.video.width,
        cfg.video.height,
        cfg.video.fps,
        cfg.video.bitrate_bps,
        cfg.encoder
    );

    let pipeline = framecast::start(&cfg)?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    let mut last_health_log = Instant::now();
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                log::info!("shutdown signal received, stopping pipeline...");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
        if pipeline.is_finished() {
            break;
        }
        if last_health_log.elapsed() < HEALTH_INTERVAL {
            continue;
        }
        last_health_log = Instant::now();
        let stats = pipeline.stats();
        log::info!(
            "health: captured={} relay={}/{} relay_drops={} encoded={} units={} datagrams={} send_failures={} source_healthy={}",
            stats.frames_captured,
            stats.relay_depth,
            cfg.relay_capacity,
            stats.relay_dropped,
            stats.frames_submitted,
            stats.units_sent,
            stats.datagrams_sent,
            stats.send_failures,
            stats.source_healthy
        );
    }

    let report = pipeline.stop()?;
    log::info!(
        "framecastd exiting ({:?}): {} frames captured, {} units sent",
        report.capture_exit,
        report.stats.frames_captured,
        report.stats.units_sent
    );
    Ok(())
}
