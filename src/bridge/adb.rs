//! adb-backed bridge implementation.
//!
//! Wraps the `adb` executable via `tokio::process`. Every child is spawned
//! with `kill_on_drop`, so a timed-out call also kills the process.

use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace, warn};

use super::BridgeClient;
use crate::error::{BridgeError, BridgeResult};

/// Bridge that shells out to the adb executable.
#[derive(Debug, Clone)]
pub struct AdbBridge {
    executable: PathBuf,
    enumerate_timeout: Duration,
}

impl AdbBridge {
    /// Create a bridge using `executable`; `enumerate_timeout` bounds `adb devices`.
    pub fn new(executable: impl Into<PathBuf>, enumerate_timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            enumerate_timeout,
        }
    }

    async fn exec(&self, args: &[&str], timeout: Duration) -> BridgeResult<Output> {
        let rendered = args.join(" ");
        trace!(command = %rendered, timeout_ms = timeout.as_millis(), "Running adb");

        let child = Command::new(&self.executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BridgeError::Spawn(format!("{}: {e}", self.executable.display())))?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(BridgeError::Spawn(e.to_string())),
            Err(_) => {
                warn!(command = %rendered, timeout_ms = timeout.as_millis(), "adb timed out, process killed");
                Err(BridgeError::Timeout {
                    command: rendered,
                    after: timeout,
                })
            }
        }
    }

    async fn exec_checked(&self, args: &[&str], timeout: Duration) -> BridgeResult<String> {
        let output = self.exec(args, timeout).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(BridgeError::CommandFailed {
                command: args.join(" "),
                status: output.status.code().unwrap_or(-1),
                stderr: if stderr.is_empty() {
                    "no stderr output".to_string()
                } else {
                    stderr
                },
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for AdbBridge {
    fn default() -> Self {
        Self::new("adb", Duration::from_secs(15))
    }
}

#[async_trait]
impl BridgeClient for AdbBridge {
    async fn list_devices(&self) -> BridgeResult<Vec<String>> {
        let stdout = self.exec_checked(&["devices"], self.enumerate_timeout).await?;
        let serials = parse_device_list(&stdout);
        debug!(count = serials.len(), "adb devices listed");
        Ok(serials)
    }

    async fn run_command(
        &self,
        serial: &str,
        command: &str,
        timeout: Duration,
    ) -> BridgeResult<String> {
        self.exec_checked(&["-s", serial, "shell", command], timeout)
            .await
    }

    async fn pull_file(
        &self,
        serial: &str,
        remote_path: &str,
        timeout: Duration,
    ) -> BridgeResult<Vec<u8>> {
        let local = tempfile::Builder::new()
            .prefix(&format!("{serial}_"))
            .suffix(".jpg")
            .tempfile()
            .map_err(|e| BridgeError::Spawn(format!("temp file: {e}")))?
            .into_temp_path();
        let local_str = local.to_string_lossy().into_owned();

        match self
            .exec_checked(&["-s", serial, "pull", remote_path, &local_str], timeout)
            .await
        {
            Ok(_) => {}
            Err(BridgeError::CommandFailed { stderr, .. })
                if stderr.contains("does not exist") || stderr.contains("No such file") =>
            {
                return Err(BridgeError::NotFound {
                    path: remote_path.to_string(),
                });
            }
            Err(e) => return Err(e),
        }

        let bytes = tokio::fs::read(&local)
            .await
            .map_err(|e| BridgeError::Spawn(format!("reading pulled file: {e}")))?;
        trace!(serial, remote_path, bytes = bytes.len(), "Pulled file");
        Ok(bytes)
    }

    async fn delete_file(
        &self,
        serial: &str,
        remote_path: &str,
        timeout: Duration,
    ) -> BridgeResult<()> {
        self.run_command(serial, &format!("rm -f {remote_path}"), timeout)
            .await
            .map(|_| ())
    }
}

/// Parse `adb devices` output into the serials that are ready.
///
/// Devices reported as `offline` or `unauthorized` are skipped.
pub fn parse_device_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of devices"))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            (parts.next() == Some("device")).then(|| serial.to_string())
        })
        .collect()
}
