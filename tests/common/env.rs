//! Environment variable helpers for tests.
#![allow(dead_code)]

use env_lock::{EnvGuard as LockedEnvGuard, lock_env};
use tracing::{instrument, trace};

use mcam::config::{CONFIG_PATH_ENV, CONFIG_SEARCH_PATHS_ENV};

/// RAII guard restoring the environment on drop.
///
/// Holding the guard also holds the process-wide env lock, so tests that
/// touch the environment never interleave.
pub struct EnvGuard<'a> {
    _guard: LockedEnvGuard<'a>,
}

impl<'a> EnvGuard<'a> {
    #[must_use]
    #[instrument]
    pub fn set(key: &'a str, value: &str) -> Self {
        trace!(key, value, "Setting env var");
        Self {
            _guard: lock_env([(key, Some(value))]),
        }
    }

    #[must_use]
    #[instrument]
    pub fn remove(key: &'a str) -> Self {
        trace!(key, "Removing env var");
        Self {
            _guard: lock_env([(key, None::<&str>)]),
        }
    }
}

/// Set the config path and search path together (either may be unset).
#[must_use]
pub fn with_config_env<'a>(path: Option<&'a str>, search: Option<&'a str>) -> LockedEnvGuard<'a> {
    lock_env([(CONFIG_PATH_ENV, path), (CONFIG_SEARCH_PATHS_ENV, search)])
}
