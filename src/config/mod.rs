//! Configuration module.
//!
//! Handles locating, loading, and validating the service configuration.

mod loader;
mod path;
mod schema;

pub use loader::{ConfigFormat, SAMPLE_CONFIG, load_config, load_config_from_str};
pub use path::{
    CONFIG_PATH_ENV, CONFIG_SEARCH_PATHS_ENV, ConfigSearch, DEFAULT_CONFIG_FILENAME, home_dir,
    normalize, user_config_path,
};
pub use schema::{
    BridgeSettings, CaptureProfile, ConfigFile, DelaySettings, PhotoLookup, PositionEntry,
    ServerSettings, Settings, ZoomPoint, validate_remote_path,
};

use std::path::PathBuf;

use tracing::error;

use crate::error::Result;

/// A loaded configuration together with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub path: PathBuf,
    pub config: ConfigFile,
}

/// Resolve and load the configuration.
pub fn load(search: &ConfigSearch) -> Result<LoadedConfig> {
    let path = search.resolve()?;
    match load_config(&path) {
        Ok(config) => Ok(LoadedConfig { path, config }),
        Err(e) => {
            error!(event = "config.load_failed", path = %path.display(), error = %e, "Configuration rejected");
            Err(e)
        }
    }
}
