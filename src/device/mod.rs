//! Device discovery and reachability.
//!
//! Devices are discovered fresh on every request through the bridge and
//! ordered by a pluggable [`PositionStrategy`].

mod position;

pub use position::{MappingTable, PositionStrategy, SerialOrder};

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::bridge::BridgeClient;
use crate::config::Settings;
use crate::error::{McError, Result};

/// A connected device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    /// Stable serial reported by the bridge.
    pub serial: String,
    /// Identifier reported to clients (the serial).
    pub identifier: String,
    /// Where the device sits in the output.
    pub position: Position,
}

impl Device {
    pub fn new(serial: impl Into<String>, index: usize, label: impl Into<String>) -> Self {
        let serial = serial.into();
        Self {
            identifier: serial.clone(),
            serial,
            position: Position {
                index,
                label: label.into(),
            },
        }
    }
}

/// Output position assigned at discovery time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    pub index: usize,
    pub label: String,
}

/// Overall health verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthStatus {
    Healthy,
    Issues,
    NoDevices,
}

/// Reachability of one device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceHealth {
    #[serde(flatten)]
    pub device: Device,
    pub ok: bool,
    pub issues: Vec<String>,
}

/// Result of [`DeviceManager::health`].
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub devices: Vec<DeviceHealth>,
}

/// Discovers reachable devices via the bridge.
#[derive(Clone)]
pub struct DeviceManager {
    bridge: Arc<dyn BridgeClient>,
    strategy: Arc<dyn PositionStrategy>,
    probe_timeout: Duration,
}

impl DeviceManager {
    /// Manager with the default [`SerialOrder`] strategy.
    pub fn new(bridge: Arc<dyn BridgeClient>, probe_timeout: Duration) -> Self {
        Self {
            bridge,
            strategy: Arc::new(SerialOrder),
            probe_timeout,
        }
    }

    /// Manager configured from settings: a [`MappingTable`] when positions
    /// are configured, [`SerialOrder`] otherwise.
    pub fn from_settings(bridge: Arc<dyn BridgeClient>, settings: &Settings) -> Self {
        let manager = Self::new(bridge, settings.command_timeout);
        if settings.positions.is_empty() {
            manager
        } else {
            manager.with_strategy(Arc::new(MappingTable::new(settings.positions.clone())))
        }
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn PositionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Enumerate connected devices in deterministic order.
    ///
    /// An empty list is a valid result.
    ///
    /// # Errors
    ///
    /// Returns [`McError::Discovery`] when enumeration fails or times out.
    #[instrument(skip(self))]
    pub async fn discover(&self) -> Result<Vec<Device>> {
        let serials = self.bridge.list_devices().await.map_err(|e| {
            warn!(error = %e, "Device enumeration failed");
            McError::Discovery(e.to_string())
        })?;
        let devices = self.strategy.arrange(serials);
        debug!(
            count = devices.len(),
            serials = ?devices.iter().map(|d| d.serial.as_str()).collect::<Vec<_>>(),
            "Devices discovered"
        );
        Ok(devices)
    }

    /// Run a no-op command on every device and report reachability.
    #[instrument(skip(self))]
    pub async fn health(&self) -> Result<HealthReport> {
        let devices = self.discover().await?;

        let mut probes = JoinSet::new();
        for device in devices.iter().cloned() {
            let bridge = Arc::clone(&self.bridge);
            let timeout = self.probe_timeout;
            probes.spawn(async move {
                let result = bridge.run_command(&device.serial, "echo ok", timeout).await;
                (device.position.index, result)
            });
        }

        let mut results: Vec<Option<DeviceHealth>> = vec![None; devices.len()];
        while let Some(joined) = probes.join_next().await {
            let Ok((index, result)) = joined else {
                continue;
            };
            let device = devices[index].clone();
            results[index] = Some(match result {
                Ok(_) => DeviceHealth {
                    device,
                    ok: true,
                    issues: Vec::new(),
                },
                Err(e) => DeviceHealth {
                    device,
                    ok: false,
                    issues: vec![e.to_string()],
                },
            });
        }

        let entries: Vec<DeviceHealth> = results
            .into_iter()
            .zip(devices)
            .map(|(entry, device)| {
                entry.unwrap_or_else(|| DeviceHealth {
                    device,
                    ok: false,
                    issues: vec!["probe task did not complete".to_string()],
                })
            })
            .collect();

        let status = if entries.is_empty() {
            HealthStatus::NoDevices
        } else if entries.iter().all(|d| d.ok) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Issues
        };
        info!(status = ?status, devices = entries.len(), "Health reported");
        Ok(HealthReport {
            status,
            devices: entries,
        })
    }
}
