//! Error types for multi-device capture operations.
//!
//! Three layers:
//! - [`McError`]: request-level failures that abort a whole request before
//!   any per-device work starts (discovery, auth, config).
//! - [`BridgeError`]: a single bridge call failed.
//! - [`DeviceError`]: the outcome of one device in a session. Never aborts
//!   sibling devices.

use std::time::Duration;

use thiserror::Error;

/// Primary error type for request-level operations.
#[derive(Error, Debug)]
pub enum McError {
    // Device errors
    #[error("Device discovery failed: {0}")]
    Discovery(String),

    // Configuration errors
    #[error("Configuration file not found (searched: {})", searched.join(", "))]
    ConfigNotFound { searched: Vec<String> },

    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    // HTTP errors
    #[error("Invalid or missing API token")]
    Authentication,

    #[error("Web server failed to start on {addr}: {reason}")]
    ServerFailed { addr: String, reason: String },

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl McError {
    /// Stable machine-readable name for this error.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Discovery(_) => "discovery_failed",
            Self::ConfigNotFound { .. } => "config_not_found",
            Self::ConfigParse(_) => "config_parse",
            Self::ConfigInvalid(_) => "config_invalid",
            Self::Authentication => "unauthorized",
            Self::ServerFailed { .. } => "server_failed",
            Self::Io(_) => "io",
            Self::Other(_) => "internal",
        }
    }

    /// Returns true if the error is recoverable by the user.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. }
                | Self::ConfigInvalid(_)
                | Self::ConfigParse(_)
                | Self::Authentication
        )
    }

    /// Returns a suggestion for how to fix the error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Discovery(_) => Some("Check that adb is installed and `adb devices` works"),
            Self::ConfigNotFound { .. } => Some("Run: mcam init"),
            Self::ConfigInvalid(_) | Self::ConfigParse(_) => {
                Some("Fix the configuration file, then run: mcam config")
            }
            Self::Authentication => {
                Some("Send the configured token as 'Authorization: Bearer <token>'")
            }
            Self::ServerFailed { .. } => Some("Pick a free address with --bind"),
            _ => None,
        }
    }
}

/// Convenience type alias for Results using McError.
pub type Result<T> = std::result::Result<T, McError>;

/// Failure of a single bridge call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("`{command}` timed out after {}ms", after.as_millis())]
    Timeout { command: String, after: Duration },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("remote file not found: {path}")]
    NotFound { path: String },

    #[error("failed to run bridge executable: {0}")]
    Spawn(String),
}

/// Result alias for bridge calls.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Per-device failure captured into that device's outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("command timed out after {}ms: {command}", after.as_millis())]
    Timeout { command: String, after: Duration },

    #[error("command failed: {command}: {reason}")]
    CommandFailed { command: String, reason: String },

    /// The shutter may already have fired.
    #[error("photo retrieval failed: {reason}")]
    PullFailed { reason: String },

    #[error("pulled file is not a readable image: {0}")]
    DecodeFailed(String),

    #[error("session deadline elapsed before the device finished")]
    SessionTimeout,

    #[error("device not primed: {cause}")]
    NotPrimed { cause: Box<DeviceError> },

    #[error("invalid transition: {event} while {state}")]
    InvalidTransition { state: String, event: String },
}

impl DeviceError {
    /// Stable machine-readable name for this error.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "device_timeout",
            Self::CommandFailed { .. } => "command_failed",
            Self::PullFailed { .. } => "pull_failed",
            Self::DecodeFailed(_) => "decode_failed",
            Self::SessionTimeout => "session_timeout",
            Self::NotPrimed { .. } => "not_primed",
            Self::InvalidTransition { .. } => "invalid_transition",
        }
    }

    /// Wrap a prime-phase failure into the aggregated "not primed" outcome.
    pub fn not_primed(cause: Self) -> Self {
        match cause {
            already @ Self::NotPrimed { .. } => already,
            other => Self::NotPrimed {
                cause: Box::new(other),
            },
        }
    }

    /// Map a bridge failure during a retrieval step.
    ///
    /// Timeouts stay timeouts; everything else is a pull failure.
    pub fn from_retrieval(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout { command, after } => Self::Timeout { command, after },
            other => Self::PullFailed {
                reason: other.to_string(),
            },
        }
    }
}

impl From<BridgeError> for DeviceError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout { command, after } => Self::Timeout { command, after },
            BridgeError::CommandFailed {
                command,
                status,
                stderr,
            } => Self::CommandFailed {
                command,
                reason: format!("exit status {status}: {stderr}"),
            },
            BridgeError::NotFound { path } => Self::PullFailed {
                reason: format!("remote file not found: {path}"),
            },
            BridgeError::Spawn(reason) => Self::CommandFailed {
                command: "adb".to_string(),
                reason,
            },
        }
    }
}
