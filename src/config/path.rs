//! Config file discovery.
//!
//! Resolution order:
//! 1. An explicit path (`--config` or `MCAM_CONFIG_PATH`), which must exist
//! 2. Each entry of `MCAM_CONFIG_SEARCH_PATHS` (OS path-list separated)
//! 3. `config.yaml`, `config/config.yaml`, then `<config dir>/mcam/config.yaml`
//!
//! Relative paths are taken from the current directory; `~` expands to home.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::{McError, Result};

/// Env var naming the config file directly.
pub const CONFIG_PATH_ENV: &str = "MCAM_CONFIG_PATH";
/// Env var holding extra search locations.
pub const CONFIG_SEARCH_PATHS_ENV: &str = "MCAM_CONFIG_SEARCH_PATHS";
/// File name looked for in default locations.
pub const DEFAULT_CONFIG_FILENAME: &str = "config.yaml";

/// Inputs for config resolution, separated from the process environment so
/// resolution is testable.
#[derive(Debug, Clone, Default)]
pub struct ConfigSearch {
    /// Explicit path; bypasses searching.
    pub explicit: Option<PathBuf>,
    /// Raw `MCAM_CONFIG_SEARCH_PATHS` value.
    pub search_env: Option<OsString>,
    /// Extra candidates after the env entries.
    pub extra: Vec<PathBuf>,
    /// Whether to append the built-in defaults.
    pub include_defaults: bool,
}

impl ConfigSearch {
    /// Build a search from the process environment and an optional CLI override.
    pub fn from_env(cli_override: Option<PathBuf>) -> Self {
        Self {
            explicit: cli_override.or_else(|| env::var_os(CONFIG_PATH_ENV).map(PathBuf::from)),
            search_env: env::var_os(CONFIG_SEARCH_PATHS_ENV),
            extra: Vec::new(),
            include_defaults: true,
        }
    }

    /// Candidate list in search order, normalized.
    pub fn candidates(&self) -> Result<Vec<PathBuf>> {
        let mut raw: Vec<PathBuf> = Vec::new();
        if let Some(search) = &self.search_env {
            raw.extend(env::split_paths(search).filter(|p| !p.as_os_str().is_empty()));
        }
        raw.extend(self.extra.iter().cloned());
        if self.include_defaults {
            raw.push(PathBuf::from(DEFAULT_CONFIG_FILENAME));
            raw.push(Path::new("config").join(DEFAULT_CONFIG_FILENAME));
            raw.extend(user_config_path());
        }
        raw.iter().map(|p| normalize(p)).collect()
    }

    /// Find the config file to load.
    pub fn resolve(&self) -> Result<PathBuf> {
        if let Some(explicit) = &self.explicit {
            let path = normalize(explicit)?;
            debug!(path = %path.display(), "Using explicit config path");
            if !path.is_file() {
                return Err(McError::ConfigNotFound {
                    searched: vec![path.display().to_string()],
                });
            }
            return Ok(path);
        }

        let candidates = self.candidates()?;
        for candidate in &candidates {
            trace!(path = %candidate.display(), "Checking config candidate");
            if candidate.is_file() {
                debug!(path = %candidate.display(), "Found config file");
                return Ok(candidate.clone());
            }
        }

        Err(McError::ConfigNotFound {
            searched: candidates.iter().map(|p| p.display().to_string()).collect(),
        })
    }
}

/// `<user config dir>/mcam/config.yaml`, when the platform has one.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mcam").join(DEFAULT_CONFIG_FILENAME))
}

/// Expand `~` and anchor relative paths at the current directory.
pub fn normalize(path: &Path) -> Result<PathBuf> {
    let path_str = path.to_string_lossy();
    if path_str == "~" || path_str.starts_with("~/") {
        let home = home_dir()?;
        let rest = path_str.strip_prefix("~/").unwrap_or("");
        return Ok(if rest.is_empty() { home } else { home.join(rest) });
    }
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(env::current_dir()?.join(path))
}

/// Resolve the user's home directory (cross-platform).
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .ok_or_else(|| McError::ConfigInvalid("Could not determine home directory".to_string()))
}
