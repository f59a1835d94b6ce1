//! Mock bridge implementation for unit testing.
//!
//! This module provides a scripted bridge that records every call and
//! supports failure, delay, and hang injection per device and command.
//!
//! # Example
//!
//! ```rust,ignore
//! use mcam::bridge::mock::{BridgeCall, MockBridge};
//!
//! let bridge = MockBridge::new(["A", "B"]);
//! bridge.fail_command("B", "am start", "Activity not found");
//! bridge.delay_command("A", "input tap", Duration::from_secs(3));
//!
//! // ... drive a session ...
//!
//! assert_eq!(bridge.count_matching("A", "KEYCODE_WAKEUP"), 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use tracing::{debug, trace};

use super::BridgeClient;
use crate::error::{BridgeError, BridgeResult};

/// Recorded call for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeCall {
    ListDevices,
    Run { serial: String, command: String },
    Pull { serial: String, path: String },
    Delete { serial: String, path: String },
}

impl BridgeCall {
    fn serial(&self) -> Option<&str> {
        match self {
            Self::ListDevices => None,
            Self::Run { serial, .. } | Self::Pull { serial, .. } | Self::Delete { serial, .. } => {
                Some(serial)
            }
        }
    }

    /// Command line this call corresponds to on the device.
    fn rendered(&self) -> String {
        match self {
            Self::ListDevices => "devices".to_string(),
            Self::Run { command, .. } => command.clone(),
            Self::Pull { path, .. } => format!("pull {path}"),
            Self::Delete { path, .. } => format!("rm -f {path}"),
        }
    }
}

/// Injected behavior for matching calls.
#[derive(Debug, Clone)]
enum Behavior {
    Fail(String),
    Delay(Duration),
    Hang,
}

#[derive(Debug, Clone)]
struct Rule {
    serial: String,
    pattern: String,
    behavior: Behavior,
}

/// Scripted bridge for testing without devices.
pub struct MockBridge {
    devices: Mutex<Vec<String>>,
    discovery_error: Mutex<Option<BridgeError>>,
    rules: Mutex<Vec<Rule>>,
    photos: Mutex<HashMap<String, Vec<u8>>>,
    missing_photos: Mutex<HashSet<String>>,
    default_photo: Vec<u8>,
    fail_deletes: AtomicBool,
    photo_counter: AtomicUsize,
    call_log: Mutex<Vec<BridgeCall>>,
}

impl MockBridge {
    /// Create a mock with the given connected serials.
    #[must_use]
    pub fn new<I, S>(devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let devices: Vec<String> = devices.into_iter().map(Into::into).collect();
        debug!(?devices, "Creating mock bridge");
        Self {
            devices: Mutex::new(devices),
            discovery_error: Mutex::new(None),
            rules: Mutex::new(Vec::new()),
            photos: Mutex::new(HashMap::new()),
            missing_photos: Mutex::new(HashSet::new()),
            default_photo: sample_png(),
            fail_deletes: AtomicBool::new(false),
            photo_counter: AtomicUsize::new(0),
            call_log: Mutex::new(Vec::new()),
        }
    }

    // === Configuration ===

    /// Replace the set of connected devices.
    pub fn set_devices<I, S>(&self, devices: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.devices.lock().unwrap() = devices.into_iter().map(Into::into).collect();
    }

    /// Make the next `list_devices` call fail.
    pub fn fail_discovery(&self, error: BridgeError) {
        *self.discovery_error.lock().unwrap() = Some(error);
    }

    /// Fail commands on `serial` containing `pattern` with a non-zero exit.
    pub fn fail_command(&self, serial: &str, pattern: &str, stderr: &str) {
        self.add_rule(serial, pattern, Behavior::Fail(stderr.to_string()));
    }

    /// Delay commands on `serial` containing `pattern`.
    ///
    /// A delay at or beyond the call's timeout produces a timeout error.
    pub fn delay_command(&self, serial: &str, pattern: &str, delay: Duration) {
        self.add_rule(serial, pattern, Behavior::Delay(delay));
    }

    /// Make commands on `serial` containing `pattern` never answer in time.
    pub fn hang_command(&self, serial: &str, pattern: &str) {
        self.add_rule(serial, pattern, Behavior::Hang);
    }

    /// Remove all injected behaviors.
    pub fn clear_rules(&self) {
        self.rules.lock().unwrap().clear();
    }

    /// Serve `bytes` as the photo pulled from `serial`.
    pub fn set_photo(&self, serial: &str, bytes: Vec<u8>) {
        self.photos.lock().unwrap().insert(serial.to_string(), bytes);
    }

    /// Report no photo at all for `serial` when listing the storage path.
    pub fn remove_photo(&self, serial: &str) {
        self.missing_photos.lock().unwrap().insert(serial.to_string());
    }

    /// Make every `delete_file` call fail.
    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    // === Assertions ===

    /// Get all recorded calls.
    #[must_use]
    pub fn calls(&self) -> Vec<BridgeCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Command lines issued to `serial`, in order.
    #[must_use]
    pub fn commands_for(&self, serial: &str) -> Vec<String> {
        self.calls()
            .iter()
            .filter(|c| c.serial() == Some(serial))
            .map(BridgeCall::rendered)
            .collect()
    }

    /// Number of calls to `serial` whose command line contains `pattern`.
    #[must_use]
    pub fn count_matching(&self, serial: &str, pattern: &str) -> usize {
        self.commands_for(serial)
            .iter()
            .filter(|c| c.contains(pattern))
            .count()
    }

    /// Number of calls made to any device (discovery excluded).
    #[must_use]
    pub fn device_call_count(&self) -> usize {
        self.calls().iter().filter(|c| c.serial().is_some()).count()
    }

    /// Assert no call to `serial` contained `pattern`.
    ///
    /// # Panics
    ///
    /// Panics if a matching call was recorded.
    pub fn assert_no_command(&self, serial: &str, pattern: &str) {
        let commands = self.commands_for(serial);
        assert!(
            !commands.iter().any(|c| c.contains(pattern)),
            "Expected no '{pattern}' on {serial}, but found: {commands:#?}",
        );
    }

    /// Clear the call log for fresh assertions.
    pub fn clear_calls(&self) {
        self.call_log.lock().unwrap().clear();
    }

    // === Internal Helpers ===

    fn add_rule(&self, serial: &str, pattern: &str, behavior: Behavior) {
        self.rules.lock().unwrap().push(Rule {
            serial: serial.to_string(),
            pattern: pattern.to_string(),
            behavior,
        });
    }

    fn record(&self, call: BridgeCall) -> String {
        trace!(?call, "Recording bridge call");
        let rendered = call.rendered();
        self.call_log.lock().unwrap().push(call);
        rendered
    }

    async fn apply_rules(
        &self,
        serial: &str,
        rendered: &str,
        timeout: Duration,
    ) -> BridgeResult<()> {
        let matching: Vec<Behavior> = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.serial == serial && rendered.contains(&r.pattern))
            .map(|r| r.behavior.clone())
            .collect();

        for behavior in matching {
            match behavior {
                Behavior::Fail(stderr) => {
                    return Err(BridgeError::CommandFailed {
                        command: rendered.to_string(),
                        status: 1,
                        stderr,
                    });
                }
                Behavior::Delay(delay) if delay < timeout => tokio::time::sleep(delay).await,
                Behavior::Delay(_) | Behavior::Hang => {
                    tokio::time::sleep(timeout).await;
                    return Err(BridgeError::Timeout {
                        command: rendered.to_string(),
                        after: timeout,
                    });
                }
            }
        }
        Ok(())
    }

    fn latest_photo_listing(&self, serial: &str, command: &str) -> String {
        if self.missing_photos.lock().unwrap().contains(serial) {
            return String::new();
        }
        let dir = command
            .strip_prefix("ls -t ")
            .and_then(|rest| rest.split("/*").next())
            .unwrap_or("/sdcard/DCIM");
        let n = self.photo_counter.fetch_add(1, Ordering::SeqCst);
        format!("{dir}/IMG_{serial}_{n:04}.jpg\n")
    }
}

#[async_trait]
impl BridgeClient for MockBridge {
    async fn list_devices(&self) -> BridgeResult<Vec<String>> {
        self.record(BridgeCall::ListDevices);
        if let Some(error) = self.discovery_error.lock().unwrap().take() {
            return Err(error);
        }
        tokio::task::yield_now().await;
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn run_command(
        &self,
        serial: &str,
        command: &str,
        timeout: Duration,
    ) -> BridgeResult<String> {
        let rendered = self.record(BridgeCall::Run {
            serial: serial.to_string(),
            command: command.to_string(),
        });
        self.apply_rules(serial, &rendered, timeout).await?;
        tokio::task::yield_now().await;

        if command.starts_with("ls -t ") {
            return Ok(self.latest_photo_listing(serial, command));
        }
        if command == "echo ok" {
            return Ok("ok\n".to_string());
        }
        Ok(String::new())
    }

    async fn pull_file(
        &self,
        serial: &str,
        remote_path: &str,
        timeout: Duration,
    ) -> BridgeResult<Vec<u8>> {
        let rendered = self.record(BridgeCall::Pull {
            serial: serial.to_string(),
            path: remote_path.to_string(),
        });
        self.apply_rules(serial, &rendered, timeout).await?;
        tokio::task::yield_now().await;

        if self.missing_photos.lock().unwrap().contains(serial) {
            return Err(BridgeError::NotFound {
                path: remote_path.to_string(),
            });
        }
        Ok(self
            .photos
            .lock()
            .unwrap()
            .get(serial)
            .cloned()
            .unwrap_or_else(|| self.default_photo.clone()))
    }

    async fn delete_file(
        &self,
        serial: &str,
        remote_path: &str,
        timeout: Duration,
    ) -> BridgeResult<()> {
        let rendered = self.record(BridgeCall::Delete {
            serial: serial.to_string(),
            path: remote_path.to_string(),
        });
        self.apply_rules(serial, &rendered, timeout).await?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BridgeError::CommandFailed {
                command: rendered,
                status: 1,
                stderr: "Read-only file system".to_string(),
            });
        }
        Ok(())
    }
}

/// A small valid PNG, served as the default photo.
#[must_use]
pub fn sample_png() -> Vec<u8> {
    let img = RgbImage::from_pixel(4, 3, Rgb([200, 40, 40]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .expect("encoding an in-memory PNG cannot fail");
    buf.into_inner()
}
