//! Configuration loading from YAML or TOML files.

use std::path::Path;

use tracing::{debug, info, instrument, trace};

use super::schema::ConfigFile;
use crate::error::{McError, Result};

/// Configuration file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format (.yaml, .yml).
    Yaml,
    /// TOML format (.toml).
    Toml,
}

impl ConfigFormat {
    /// Detect format from file extension.
    ///
    /// Returns `None` if the extension is not recognized.
    #[must_use]
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        trace!(extension = %ext, "Detecting config format from extension");
        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// Load and validate a configuration file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read
/// - The format cannot be detected from the extension
/// - The file content cannot be parsed
/// - Validation fails
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ConfigFile> {
    let path = path.as_ref();
    debug!("Loading configuration file");

    let format = ConfigFormat::from_extension(path).ok_or_else(|| {
        McError::ConfigParse(format!(
            "Unknown config format for '{}': expected .yaml, .yml, or .toml",
            path.display()
        ))
    })?;

    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            McError::ConfigNotFound {
                searched: vec![path.display().to_string()],
            }
        } else {
            McError::Io(e)
        }
    })?;
    debug!(bytes = content.len(), format = ?format, "Read config file");

    let config = load_config_from_str(&content, format)?;
    info!(event = "config.loaded", path = %path.display(), "Configuration loaded");
    Ok(config)
}

/// Load a configuration from a string with a specified format.
///
/// # Errors
///
/// Returns an error if parsing or validation fails.
#[instrument(skip(content), fields(format = ?format, content_len = content.len()))]
pub fn load_config_from_str(content: &str, format: ConfigFormat) -> Result<ConfigFile> {
    let config: ConfigFile = match format {
        ConfigFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| McError::ConfigParse(format!("YAML: {e}")))?
        }
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| McError::ConfigParse(format!("TOML: {e}")))?
        }
    };

    config.validate()?;

    debug!(
        package = %config.settings.camera_defaults.package,
        request_timeout_ms = config.settings.request_timeout.as_millis(),
        command_timeout_ms = config.settings.command_timeout.as_millis(),
        positions = config.settings.positions.len(),
        "Configuration validated"
    );
    Ok(config)
}

/// Sample configuration written by `mcam init`.
pub const SAMPLE_CONFIG: &str = r"# mcam configuration
settings:
  # Overall deadline for one prime or capture request.
  request_timeout_seconds: 30
  # Deadline for each individual adb command.
  adb_command_timeout_seconds: 15
  step_attempts: 1
  revalidate_cached: false
  # Optional fixed ordering; unlisted devices follow in serial order.
  positions: []
  camera_defaults:
    package: com.android.camera2
    activity: com.android.camera.CameraLauncher
    photo_location: /sdcard/DCIM/Camera
    zoom_point: { x: 540, y: 1200 }
    skip_zoom: false
    delays:
      camera_open: 2.0
      zoom: 0.5
      photo_capture: 1.0
      photo_save: 1.5
    photo_lookup: { attempts: 20, interval: 0.3 }
server:
  bind: 127.0.0.1:8000
  serialize_requests: true
bridge:
  executable: adb
";
