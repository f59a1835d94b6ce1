//! Concurrent prime and capture across every discovered device.
//!
//! A [`CaptureSession`] fans one task per device out onto a
//! [`JoinSet`] and fans the outcomes back in, in discovery order. A single
//! deadline, measured from batch start, bounds the whole session; devices
//! still running when it elapses are aborted and reported as
//! [`DeviceError::SessionTimeout`]. One device failing never affects the
//! others.

mod cache;

pub use cache::SessionCache;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bridge::BridgeClient;
use crate::config::{CaptureProfile, Settings};
use crate::device::Device;
use crate::error::DeviceError;
use crate::image_ops::CapturedImage;
use crate::machine::{CameraStateMachine, MachineOptions};

/// Per-session knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Overall deadline from batch start.
    pub deadline: Duration,
    /// Ping a cached machine before reusing it.
    pub revalidate_cached: bool,
    pub machine: MachineOptions,
}

impl SessionOptions {
    pub const fn from_settings(settings: &Settings) -> Self {
        Self {
            deadline: settings.request_timeout,
            revalidate_cached: settings.revalidate_cached,
            machine: MachineOptions {
                command_timeout: settings.command_timeout,
                step_attempts: settings.step_attempts,
            },
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(30),
            revalidate_cached: false,
            machine: MachineOptions::default(),
        }
    }
}

/// Result for one device.
#[derive(Debug, Clone)]
pub struct DeviceOutcome<T> {
    pub device: Device,
    pub result: Result<T, DeviceError>,
}

impl<T> DeviceOutcome<T> {
    pub const fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Successful prime of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrimeReport {
    /// A previously cached machine for this device was discarded.
    pub replaced: bool,
}

/// One prime or capture batch.
pub struct CaptureSession {
    id: Uuid,
    bridge: Arc<dyn BridgeClient>,
    cache: Arc<SessionCache>,
    profile: Arc<CaptureProfile>,
    options: SessionOptions,
}

impl CaptureSession {
    pub fn new(
        bridge: Arc<dyn BridgeClient>,
        cache: Arc<SessionCache>,
        profile: Arc<CaptureProfile>,
        options: SessionOptions,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            bridge,
            cache,
            profile,
            options,
        }
    }

    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Bring every device to `Primed`, reusing cached machines.
    pub async fn prime(&self, devices: &[Device]) -> Vec<DeviceOutcome<PrimeReport>> {
        self.run_all("prime", devices, Worker::prime).await
    }

    /// Prime where needed, then capture from every device.
    pub async fn capture(&self, devices: &[Device]) -> Vec<DeviceOutcome<CapturedImage>> {
        self.run_all("capture", devices, Worker::capture).await
    }

    async fn run_all<T, F, Fut>(
        &self,
        phase: &'static str,
        devices: &[Device],
        op: F,
    ) -> Vec<DeviceOutcome<T>>
    where
        T: Send + 'static,
        F: Fn(Worker) -> Fut,
        Fut: Future<Output = Result<T, DeviceError>> + Send + 'static,
    {
        let session_id = self.id;
        let started = Instant::now();
        let deadline = started + self.options.deadline;
        info!(%session_id, phase, devices = devices.len(), "Session started");

        let mut tasks = JoinSet::new();
        for (slot, device) in devices.iter().enumerate() {
            let worker = Worker {
                device: device.clone(),
                bridge: Arc::clone(&self.bridge),
                cache: Arc::clone(&self.cache),
                profile: Arc::clone(&self.profile),
                options: self.options,
            };
            let pipeline = op(worker);
            tasks.spawn(async move { (slot, pipeline.await) });
        }

        let mut results: Vec<Option<Result<T, DeviceError>>> =
            devices.iter().map(|_| None).collect();
        let mut expired = false;
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((slot, result)))) => results[slot] = Some(result),
                Ok(Some(Err(join_error))) => {
                    error!(%session_id, error = %join_error, "Device task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    let late = collect_finished(&mut tasks, &mut results);
                    warn!(%session_id, phase, late, pending = tasks.len(), "Session deadline elapsed");
                    tasks.shutdown().await;
                    expired = true;
                    break;
                }
            }
        }

        let outcomes: Vec<DeviceOutcome<T>> = devices
            .iter()
            .cloned()
            .zip(results)
            .map(|(device, result)| {
                let result = result.unwrap_or_else(|| {
                    Err(if expired {
                        DeviceError::SessionTimeout
                    } else {
                        DeviceError::CommandFailed {
                            command: phase.to_string(),
                            reason: "device task panicked".to_string(),
                        }
                    })
                });
                DeviceOutcome { device, result }
            })
            .collect();

        let ok = outcomes.iter().filter(|o| o.is_ok()).count();
        for outcome in outcomes.iter().filter(|o| !o.is_ok()) {
            if let Err(reason) = &outcome.result {
                debug!(%session_id, serial = %outcome.device.serial, kind = reason.kind(), error = %reason, "Device outcome");
            }
        }
        info!(
            %session_id,
            phase,
            ok,
            failed = outcomes.len() - ok,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Session finished"
        );
        outcomes
    }
}

type Slotted<T> = (usize, Result<T, DeviceError>);

/// Move already-finished tasks into `results` without waiting. Returns how
/// many were collected.
fn collect_finished<T: 'static>(
    tasks: &mut JoinSet<Slotted<T>>,
    results: &mut [Option<Result<T, DeviceError>>],
) -> usize {
    let mut collected = 0;
    while let Some(joined) = tasks.try_join_next() {
        if let Ok((slot, result)) = joined {
            results[slot] = Some(result);
            collected += 1;
        }
    }
    collected
}

/// Everything one device's pipeline task owns.
struct Worker {
    device: Device,
    bridge: Arc<dyn BridgeClient>,
    cache: Arc<SessionCache>,
    profile: Arc<CaptureProfile>,
    options: SessionOptions,
}

impl Worker {
    /// Cached machine if usable, otherwise a fresh one.
    async fn acquire(&self) -> CameraStateMachine {
        if let Some(mut machine) = self.cache.take(&self.device.serial) {
            machine.reposition(self.device.position.clone());
            if !self.options.revalidate_cached {
                return machine;
            }
            match machine.ping().await {
                Ok(()) => return machine,
                Err(e) => {
                    warn!(serial = %self.device.serial, error = %e, "Cached machine failed revalidation; re-priming");
                }
            }
        }
        self.fresh_machine()
    }

    fn fresh_machine(&self) -> CameraStateMachine {
        CameraStateMachine::new(
            self.device.clone(),
            Arc::clone(&self.bridge),
            Arc::clone(&self.profile),
            self.options.machine,
        )
    }

    /// Always primes a fresh machine. The old entry is dropped first so it
    /// cannot outlive a failed re-prime.
    async fn prime(self) -> Result<PrimeReport, DeviceError> {
        let replaced = self.cache.take(&self.device.serial).is_some();
        if replaced {
            debug!(serial = %self.device.serial, "Discarded cached machine before re-prime");
        }
        let mut machine = self.fresh_machine();
        machine.prime().await?;
        let _ = self.cache.insert(machine);
        Ok(PrimeReport { replaced })
    }

    async fn capture(self) -> Result<CapturedImage, DeviceError> {
        let mut machine = self.acquire().await;
        machine.prime().await.map_err(DeviceError::not_primed)?;
        let result = machine.capture().await;
        // Only a machine still `Primed` is accepted back.
        let _ = self.cache.insert(machine);
        result
    }
}
