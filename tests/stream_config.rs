use std::io::Write;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use framecast::config::{ConfigOverrides, EncoderKind, StreamConfig};
use framecast::OversizePolicy;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FRAMECAST_CONFIG",
        "FRAMECAST_SOURCE",
        "FRAMECAST_DESTINATION",
        "FRAMECAST_ENCODER",
        "FRAMECAST_WIDTH",
        "FRAMECAST_HEIGHT",
        "FRAMECAST_FPS",
        "FRAMECAST_BITRATE",
        "FRAMECAST_RELAY_CAPACITY",
        "FRAMECAST_MAX_DATAGRAM",
        "FRAMECAST_OVERSIZE",
    ] {
        std::env::remove_var(key);
    }
}

fn config_file(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(json.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        r#"{
            "source": { "uri": "stub://bench", "buffer_depth": 2 },
            "video": { "width": 640, "height": 360, "fps": 25, "bitrate": 1200000, "gop": 1 },
            "encoder": "stub",
            "relay": { "capacity": 8 },
            "transport": { "destination": "10.0.0.5:5000", "max_datagram": 1200, "oversize": "drop" },
            "frame_limit": 300
        }"#,
    );

    std::env::set_var("FRAMECAST_DESTINATION", "127.0.0.1:6000");
    std::env::set_var("FRAMECAST_FPS", "15");

    let cfg = StreamConfig::load(Some(file.path())).expect("load config");

    assert_eq!(cfg.source, "stub://bench");
    assert_eq!(cfg.buffer_depth, 2);
    assert_eq!((cfg.video.width, cfg.video.height), (640, 360));
    assert_eq!(cfg.video.fps, 15);
    assert_eq!(cfg.video.bitrate_bps, 1_200_000);
    assert_eq!(cfg.encoder, EncoderKind::Stub);
    assert_eq!(cfg.relay_capacity, 8);
    assert_eq!(cfg.destination, "127.0.0.1:6000");
    assert_eq!(cfg.max_datagram, 1200);
    assert_eq!(cfg.oversize_policy, OversizePolicy::Drop);
    assert_eq!(cfg.frame_limit, Some(300));

    clear_env();
}

#[test]
fn flags_override_env_and_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        r#"{
            "source": { "uri": "stub://file" },
            "transport": { "destination": "10.0.0.5:5000" },
            "encoder": "stub"
        }"#,
    );
    std::env::set_var("FRAMECAST_SOURCE", "stub://env");
    std::env::set_var("FRAMECAST_DESTINATION", "127.0.0.1:6000");

    let mut cfg = StreamConfig::load(Some(file.path())).expect("load config");
    cfg.apply_overrides(ConfigOverrides {
        source: Some("stub://flag".to_string()),
        frame_limit: Some(50),
        ..ConfigOverrides::default()
    })
    .expect("apply overrides");

    assert_eq!(cfg.source, "stub://flag");
    assert_eq!(cfg.destination, "127.0.0.1:6000");
    assert_eq!(cfg.frame_limit, Some(50));
    assert_eq!(cfg.encoder, EncoderKind::Stub);

    let err = cfg
        .apply_overrides(ConfigOverrides {
            frame_limit: Some(0),
            ..ConfigOverrides::default()
        })
        .unwrap_err();
    assert!(err.to_string().contains("frame limit"));

    clear_env();
}

#[test]
fn config_path_can_come_from_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(r#"{ "source": { "uri": "stub://from-env" } }"#);
    std::env::set_var("FRAMECAST_CONFIG", file.path());

    let cfg = StreamConfig::load(None).expect("load config");
    assert_eq!(cfg.source, "stub://from-env");
    assert_eq!(cfg.destination, "127.0.0.1:5000");

    clear_env();
}

#[test]
fn defaults_apply_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = StreamConfig::load(None).expect("load config");
    assert_eq!(cfg.source, "/dev/video0");
    assert_eq!(cfg.relay_capacity, 5);
    assert_eq!(cfg.video.bitrate_bps, 800_000);
    assert_eq!(cfg.frame_limit, None);
}

#[test]
fn invalid_env_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FRAMECAST_WIDTH", "wide");
    let err = StreamConfig::load(None).unwrap_err();
    assert!(err.to_string().contains("FRAMECAST_WIDTH"));
    clear_env();

    std::env::set_var("FRAMECAST_RELAY_CAPACITY", "0");
    assert!(StreamConfig::load(None).is_err());
    clear_env();

    std::env::set_var("FRAMECAST_OVERSIZE", "fragment");
    assert!(StreamConfig::load(None).is_err());
    clear_env();
}

#[test]
fn invalid_files_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(r#"{ "video": { "width": "wide" } }"#);
    assert!(StreamConfig::load(Some(file.path())).is_err());

    let file = config_file(r#"{ "video": { "width": 501 } }"#);
    assert!(StreamConfig::load(Some(file.path())).is_err());

    let missing = std::env::temp_dir().join("framecast-missing-config.json");
    assert!(StreamConfig::load(Some(&missing)).is_err());
}
