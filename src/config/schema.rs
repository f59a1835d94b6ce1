//! Data types representing the service configuration file.
//!
//! # Example YAML
//!
//! ```yaml
//! settings:
//!   request_timeout_seconds: 30
//!   adb_command_timeout_seconds: 15
//!   camera_defaults:
//!     package: com.example.camera
//!     activity: .MainActivity
//!     photo_location: /sdcard/DCIM/Camera
//!     zoom_point: { x: 540, y: 1200 }
//!     delays: { camera_open: 2.0, zoom: 0.5, photo_capture: 1.0, photo_save: 1.5 }
//! server:
//!   bind: 127.0.0.1:8000
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{McError, Result};

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Capture behavior.
    pub settings: Settings,
    /// HTTP server options.
    #[serde(default)]
    pub server: ServerSettings,
    /// Bridge executable options.
    #[serde(default)]
    pub bridge: BridgeSettings,
}

impl ConfigFile {
    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.settings.validate()?;
        self.server.validate()?;
        Ok(())
    }
}

/// Capture behavior shared by all sessions.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Per-device capture profile.
    pub camera_defaults: CaptureProfile,

    /// Overall session deadline.
    #[serde(
        rename = "request_timeout_seconds",
        with = "seconds",
        default = "default_request_timeout"
    )]
    pub request_timeout: Duration,

    /// Deadline for each remote command.
    #[serde(
        rename = "adb_command_timeout_seconds",
        with = "seconds",
        default = "default_command_timeout"
    )]
    pub command_timeout: Duration,

    /// Attempts per prime step before the device is failed.
    #[serde(default = "default_attempts")]
    pub step_attempts: u32,

    /// Run a liveness check before reusing a cached primed device.
    #[serde(default)]
    pub revalidate_cached: bool,

    /// Optional serial → label table; devices are ordered by table position.
    #[serde(default)]
    pub positions: Vec<PositionEntry>,
}

impl Settings {
    /// Validate timeouts, attempts, positions, and the capture profile.
    pub fn validate(&self) -> Result<()> {
        trace!("Validating settings");
        if self.request_timeout.is_zero() {
            return Err(McError::ConfigInvalid(
                "settings.request_timeout_seconds must be > 0".to_string(),
            ));
        }
        if self.command_timeout.is_zero() {
            return Err(McError::ConfigInvalid(
                "settings.adb_command_timeout_seconds must be > 0".to_string(),
            ));
        }
        if self.step_attempts == 0 {
            return Err(McError::ConfigInvalid(
                "settings.step_attempts must be >= 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.positions {
            if entry.serial.trim().is_empty() || entry.label.trim().is_empty() {
                return Err(McError::ConfigInvalid(
                    "settings.positions entries need a non-empty serial and label".to_string(),
                ));
            }
            validate_label("settings.positions.label", &entry.label)?;
            if !seen.insert(entry.serial.as_str()) {
                return Err(McError::ConfigInvalid(format!(
                    "settings.positions lists serial '{}' more than once",
                    entry.serial
                )));
            }
        }

        self.camera_defaults.validate()?;
        debug!(positions = self.positions.len(), "Settings validated");
        Ok(())
    }
}

/// One row of the position mapping table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PositionEntry {
    pub serial: String,
    pub label: String,
}

/// What to launch and where to find photos on each device.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureProfile {
    /// Android package of the camera app.
    pub package: String,
    /// Activity to start inside `package`.
    pub activity: String,
    /// On-device directory photos are saved into.
    pub photo_location: String,
    /// Screen coordinate tapped to set zoom.
    pub zoom_point: ZoomPoint,
    /// Skip the zoom tap entirely.
    #[serde(default)]
    pub skip_zoom: bool,
    /// Settle delays after each step.
    pub delays: DelaySettings,
    /// Polling used to find the saved photo.
    #[serde(default)]
    pub photo_lookup: PhotoLookup,
}

impl CaptureProfile {
    /// `package/activity` component name for `am start -n`.
    pub fn component(&self) -> String {
        format!("{}/{}", self.package, self.activity)
    }

    /// Validate identifiers, the remote path, and lookup settings.
    pub fn validate(&self) -> Result<()> {
        validate_identifier("package", &self.package)?;
        validate_identifier("activity", &self.activity)?;
        validate_remote_path("photo_location", &self.photo_location)?;
        if self.photo_lookup.attempts == 0 {
            return Err(McError::ConfigInvalid(
                "photo_lookup.attempts must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tap coordinate in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ZoomPoint {
    pub x: i32,
    pub y: i32,
}

/// Named settle delays, in seconds on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct DelaySettings {
    #[serde(with = "seconds")]
    pub camera_open: Duration,
    #[serde(with = "seconds")]
    pub zoom: Duration,
    #[serde(with = "seconds")]
    pub photo_capture: Duration,
    #[serde(with = "seconds")]
    pub photo_save: Duration,
}

impl DelaySettings {
    /// All delays zero.
    pub const fn none() -> Self {
        Self {
            camera_open: Duration::ZERO,
            zoom: Duration::ZERO,
            photo_capture: Duration::ZERO,
            photo_save: Duration::ZERO,
        }
    }
}

/// How long to look for the photo after the shutter fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PhotoLookup {
    #[serde(default = "default_lookup_attempts")]
    pub attempts: u32,
    #[serde(with = "seconds", default = "default_lookup_interval")]
    pub interval: Duration,
}

impl Default for PhotoLookup {
    fn default() -> Self {
        Self {
            attempts: default_lookup_attempts(),
            interval: default_lookup_interval(),
        }
    }
}

/// HTTP server options.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    /// Listen address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Bearer token required on mutating endpoints.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Run prime/capture requests one at a time.
    #[serde(default = "default_true")]
    pub serialize_requests: bool,
}

impl ServerSettings {
    fn validate(&self) -> Result<()> {
        if let Some(token) = &self.api_token {
            if token.trim().is_empty() {
                return Err(McError::ConfigInvalid(
                    "server.api_token must not be blank; omit it to disable auth".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_token: None,
            serialize_requests: true,
        }
    }
}

/// Bridge executable options.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeSettings {
    #[serde(default = "default_executable")]
    pub executable: PathBuf,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            executable: default_executable(),
        }
    }
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_command_timeout() -> Duration {
    Duration::from_secs(15)
}

const fn default_attempts() -> u32 {
    1
}

const fn default_lookup_attempts() -> u32 {
    20
}

const fn default_lookup_interval() -> Duration {
    Duration::from_millis(300)
}

const fn default_true() -> bool {
    true
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_executable() -> PathBuf {
    PathBuf::from("adb")
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(McError::ConfigInvalid(format!(
            "Field '{field}' must be a non-empty string"
        )));
    }
    Ok(())
}

/// Android package or activity name: letters, digits, dots, underscores.
fn validate_identifier(field: &str, value: &str) -> Result<()> {
    require_non_empty(field, value)?;
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.'))
    {
        return Err(McError::ConfigInvalid(format!(
            "Field '{field}' must only contain letters, numbers, dots, or underscores"
        )));
    }
    Ok(())
}

/// Position labels end up in output file names.
fn validate_label(field: &str, value: &str) -> Result<()> {
    require_non_empty(field, value)?;
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(McError::ConfigInvalid(format!(
            "Field '{field}' must only contain letters, numbers, dots, underscores, or hyphens, got '{value}'"
        )));
    }
    if value == "." || value == ".." {
        return Err(McError::ConfigInvalid(format!(
            "Field '{field}' cannot be '{value}'"
        )));
    }
    Ok(())
}

/// Remote paths are interpolated into shell commands, so only a strict
/// character set is accepted.
pub fn validate_remote_path(field: &str, value: &str) -> Result<()> {
    require_non_empty(field, value)?;
    let safe = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | '-'));
    if !safe {
        return Err(McError::ConfigInvalid(format!(
            "Field '{field}' must only contain letters, numbers, dots, slashes, underscores, or hyphens"
        )));
    }
    if value.split('/').any(|segment| segment == "..") {
        return Err(McError::ConfigInvalid(format!(
            "Field '{field}' must not contain parent directory segments"
        )));
    }
    if value.starts_with('-') {
        return Err(McError::ConfigInvalid(format!(
            "Field '{field}' cannot start with '-'"
        )));
    }
    Ok(())
}

/// Durations stored as fractional seconds.
mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            D::Error::custom(format!(
                "expected a non-negative number of seconds, got {secs}"
            ))
        })
    }
}
