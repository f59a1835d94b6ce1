//! Bridge abstraction over the adb command/file-transfer channel.
//!
//! This module provides a trait-based abstraction over the real adb
//! executable and a scripted mock, so that the capture state machine and
//! the session orchestrator can be tested without physical devices.

mod adb;
pub mod mock;

pub use adb::{AdbBridge, parse_device_list};

use std::time::Duration;

use async_trait::async_trait;

use crate::error::BridgeResult;

/// Remote command and file-transfer operations on connected devices.
///
/// # Implementation Notes
///
/// - Calls for different serials must not serialize behind each other
/// - Every call except `list_devices` takes its own deadline; exceeding it
///   yields [`BridgeError::Timeout`](crate::error::BridgeError::Timeout)
/// - `run_command` returns stdout on a zero exit status
#[async_trait]
pub trait BridgeClient: Send + Sync {
    /// Enumerate the serials of devices in the ready state.
    async fn list_devices(&self) -> BridgeResult<Vec<String>>;

    /// Run a shell command on a device.
    async fn run_command(&self, serial: &str, command: &str, timeout: Duration)
    -> BridgeResult<String>;

    /// Copy a file from the device to the host and return its bytes.
    async fn pull_file(
        &self,
        serial: &str,
        remote_path: &str,
        timeout: Duration,
    ) -> BridgeResult<Vec<u8>>;

    /// Delete a file on the device.
    async fn delete_file(&self, serial: &str, remote_path: &str, timeout: Duration)
    -> BridgeResult<()>;
}
