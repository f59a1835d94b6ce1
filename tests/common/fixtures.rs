//! Test fixtures: profiles, configs, sessions, and config files.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mcam::bridge::mock::MockBridge;
use mcam::config::{
    CaptureProfile, ConfigFile, ConfigFormat, DelaySettings, PhotoLookup, ZoomPoint,
    load_config_from_str,
};
use mcam::device::{Device, PositionStrategy, SerialOrder};
use mcam::machine::MachineOptions;
use mcam::session::{CaptureSession, SessionCache, SessionOptions};

/// Config with no settle delays, suitable for paused-time tests.
pub const TEST_CONFIG: &str = r"
settings:
  request_timeout_seconds: 10
  adb_command_timeout_seconds: 2
  camera_defaults:
    package: com.example.camera
    activity: .MainActivity
    photo_location: /sdcard/DCIM/Camera
    zoom_point: { x: 540, y: 1200 }
    delays: { camera_open: 0, zoom: 0, photo_capture: 0, photo_save: 0 }
    photo_lookup: { attempts: 3, interval: 0.1 }
server:
  serialize_requests: true
";

pub fn config() -> ConfigFile {
    load_config_from_str(TEST_CONFIG, ConfigFormat::Yaml).expect("test config is valid")
}

pub fn profile() -> CaptureProfile {
    CaptureProfile {
        package: "com.example.camera".to_string(),
        activity: ".MainActivity".to_string(),
        photo_location: "/sdcard/DCIM/Camera".to_string(),
        zoom_point: ZoomPoint { x: 540, y: 1200 },
        skip_zoom: false,
        delays: DelaySettings::none(),
        photo_lookup: PhotoLookup {
            attempts: 3,
            interval: Duration::from_millis(100),
        },
    }
}

/// Session options with the given deadline and per-command timeout.
pub fn options(deadline: Duration, command_timeout: Duration) -> SessionOptions {
    SessionOptions {
        deadline,
        revalidate_cached: false,
        machine: MachineOptions {
            command_timeout,
            step_attempts: 1,
        },
    }
}

pub fn session_with(
    bridge: &Arc<MockBridge>,
    cache: &Arc<SessionCache>,
    profile: CaptureProfile,
    options: SessionOptions,
) -> CaptureSession {
    CaptureSession::new(bridge.clone(), Arc::clone(cache), Arc::new(profile), options)
}

/// Session with a 10s deadline and 2s command timeout.
pub fn session(bridge: &Arc<MockBridge>, cache: &Arc<SessionCache>) -> CaptureSession {
    session_with(
        bridge,
        cache,
        profile(),
        options(Duration::from_secs(10), Duration::from_secs(2)),
    )
}

/// Devices in default serial order.
pub fn devices(serials: &[&str]) -> Vec<Device> {
    SerialOrder.arrange(serials.iter().map(ToString::to_string).collect())
}

/// Profile with real settle delays, for deadline tests.
pub fn slow_profile() -> CaptureProfile {
    CaptureProfile {
        delays: DelaySettings {
            camera_open: Duration::from_secs(2),
            zoom: Duration::from_millis(500),
            photo_capture: Duration::from_secs(1),
            photo_save: Duration::from_millis(1500),
        },
        ..profile()
    }
}

/// Write `content` to `dir/name` and return the path.
pub fn write_config(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create config dir");
    }
    fs::write(&path, content).expect("write config");
    path
}
