//! Per-device capture state machine.
//!
//! [`CameraStateMachine`] owns one device's lifecycle. It feeds events to
//! the pure [`transition`] function and runs the resulting [`Effect`]s
//! against the bridge. Taking `&mut self` for every operation means at most
//! one transition is ever in flight per machine.

mod state;

pub use state::{CameraState, Effect, Event, TransitionOptions, transition};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, trace, warn};

use crate::bridge::BridgeClient;
use crate::config::{CaptureProfile, validate_remote_path};
use crate::device::{Device, Position};
use crate::error::{BridgeError, DeviceError};
use crate::image_ops::{self, CapturedImage};

/// Settle time after the wake and unlock key events.
const KEY_SETTLE: Duration = Duration::from_millis(100);

/// Per-machine knobs taken from settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineOptions {
    /// Deadline for each bridge call.
    pub command_timeout: Duration,
    /// Attempts per prime step.
    pub step_attempts: u32,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(15),
            step_attempts: 1,
        }
    }
}

/// Whether a non-zero exit fails the step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    Strict,
    Tolerant,
}

/// Drives one device from `Idle` through `Primed` to `Done`.
pub struct CameraStateMachine {
    device: Device,
    state: CameraState,
    bridge: Arc<dyn BridgeClient>,
    profile: Arc<CaptureProfile>,
    options: MachineOptions,
    remote_photo: Option<String>,
    pulled: Option<Vec<u8>>,
    image: Option<CapturedImage>,
}

impl std::fmt::Debug for CameraStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraStateMachine")
            .field("device", &self.device)
            .field("state", &self.state)
            .field("options", &self.options)
            .field("remote_photo", &self.remote_photo)
            .finish_non_exhaustive()
    }
}

impl CameraStateMachine {
    pub fn new(
        device: Device,
        bridge: Arc<dyn BridgeClient>,
        profile: Arc<CaptureProfile>,
        options: MachineOptions,
    ) -> Self {
        Self {
            device,
            state: CameraState::Idle,
            bridge,
            profile,
            options,
            remote_photo: None,
            pulled: None,
            image: None,
        }
    }

    pub const fn device(&self) -> &Device {
        &self.device
    }

    pub fn serial(&self) -> &str {
        &self.device.serial
    }

    pub const fn state(&self) -> &CameraState {
        &self.state
    }

    pub const fn is_primed(&self) -> bool {
        self.state.is_primed()
    }

    /// Adopt the position assigned by the current discovery.
    pub(crate) fn reposition(&mut self, position: Position) {
        self.device.position = position;
    }

    /// Failure reason when the machine is in `Failed`.
    pub const fn last_error(&self) -> Option<&DeviceError> {
        match &self.state {
            CameraState::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Move the device into `Primed`.
    ///
    /// A machine that is already primed returns immediately without issuing
    /// any command.
    ///
    /// # Errors
    ///
    /// Returns the failing step's error; the machine is left in `Failed`.
    /// Calling this on a terminal machine yields `InvalidTransition`.
    #[instrument(skip(self), fields(serial = %self.device.serial))]
    pub async fn prime(&mut self) -> Result<(), DeviceError> {
        if self.state.is_primed() {
            trace!("Already primed");
            return Ok(());
        }
        self.drive(Event::Prime).await?;
        match &self.state {
            CameraState::Primed => {
                info!(position = %self.device.position.label, "Device primed");
                Ok(())
            }
            CameraState::Failed(reason) => Err(reason.clone()),
            other => Err(DeviceError::InvalidTransition {
                state: other.name().to_string(),
                event: Event::Prime.name().to_string(),
            }),
        }
    }

    /// Fire the shutter and retrieve the resulting photo.
    ///
    /// The camera app is released afterwards whether or not capture worked.
    ///
    /// # Errors
    ///
    /// A machine that is not `Primed` returns `NotPrimed` without issuing
    /// any command. Otherwise returns the failing capture step's error.
    #[instrument(skip(self), fields(serial = %self.device.serial))]
    pub async fn capture(&mut self) -> Result<CapturedImage, DeviceError> {
        if !self.state.is_primed() {
            let cause = self.last_error().cloned().unwrap_or_else(|| {
                DeviceError::InvalidTransition {
                    state: self.state.name().to_string(),
                    event: Event::Capture.name().to_string(),
                }
            });
            return Err(DeviceError::not_primed(cause));
        }

        let guard = ReleaseGuard::arm(self);
        let outcome = self.drive(Event::Capture).await;
        self.release().await;
        guard.disarm();
        outcome?;

        match &self.state {
            CameraState::Done => self.image.take().ok_or_else(|| {
                DeviceError::DecodeFailed("decode step produced no image".to_string())
            }),
            CameraState::Failed(reason) => Err(reason.clone()),
            other => Err(DeviceError::InvalidTransition {
                state: other.name().to_string(),
                event: Event::Capture.name().to_string(),
            }),
        }
    }

    /// Cheap liveness check used before reusing a cached machine.
    ///
    /// # Errors
    ///
    /// Returns the bridge failure mapped to a device error.
    pub async fn ping(&self) -> Result<(), DeviceError> {
        self.shell("echo ok", Check::Strict).await.map(|_| ())
    }

    /// Feed `start` and keep executing effects until none remain.
    async fn drive(&mut self, start: Event) -> Result<(), DeviceError> {
        let mut effect = self.apply(start)?;
        while effect != Effect::None {
            let attempts = if effect.is_retryable() {
                self.options.step_attempts.max(1)
            } else {
                1
            };
            let event = match self.run_with_attempts(effect, attempts).await {
                Ok(()) => Event::StepSucceeded,
                Err(reason) => {
                    warn!(serial = %self.device.serial, state = %self.state, error = %reason, "Step failed");
                    Event::StepFailed(reason)
                }
            };
            effect = self.apply(event)?;
        }
        Ok(())
    }

    fn apply(&mut self, event: Event) -> Result<Effect, DeviceError> {
        let options = TransitionOptions {
            skip_zoom: self.profile.skip_zoom,
        };
        let event_name = event.name();
        let (next, effect) = transition(&self.state, event, options)?;
        debug!(
            serial = %self.device.serial,
            from = %self.state,
            to = %next,
            event = event_name,
            "State transition"
        );
        self.state = next;
        Ok(effect)
    }

    async fn run_with_attempts(
        &mut self,
        effect: Effect,
        attempts: u32,
    ) -> Result<(), DeviceError> {
        let mut attempt = 1;
        loop {
            match self.run_effect(effect).await {
                Ok(()) => return Ok(()),
                Err(reason) if attempt < attempts => {
                    debug!(?effect, attempt, error = %reason, "Retrying step");
                    attempt += 1;
                }
                Err(reason) => return Err(reason),
            }
        }
    }

    async fn run_effect(&mut self, effect: Effect) -> Result<(), DeviceError> {
        let profile = Arc::clone(&self.profile);
        match effect {
            Effect::None => {}
            Effect::Wake => {
                self.shell("input keyevent KEYCODE_WAKEUP", Check::Tolerant).await?;
                settle(KEY_SETTLE).await;
            }
            Effect::Unlock => {
                self.shell("input keyevent KEYCODE_MENU", Check::Tolerant).await?;
                settle(KEY_SETTLE).await;
            }
            Effect::LaunchApp => {
                self.shell(&format!("mkdir -p {}", profile.photo_location), Check::Tolerant)
                    .await?;
                self.shell(&format!("am force-stop {}", profile.package), Check::Tolerant)
                    .await?;
                self.shell(&format!("am start -n {}", profile.component()), Check::Strict)
                    .await?;
                settle(profile.delays.camera_open).await;
            }
            Effect::Zoom => {
                let point = profile.zoom_point;
                self.shell(&format!("input tap {} {}", point.x, point.y), Check::Strict)
                    .await?;
                settle(profile.delays.zoom).await;
            }
            Effect::Trigger => {
                self.shell("input keyevent KEYCODE_VOLUME_DOWN", Check::Strict)
                    .await?;
                settle(profile.delays.photo_capture).await;
            }
            Effect::AwaitSave => {
                settle(profile.delays.photo_save).await;
                self.remote_photo = Some(self.locate_latest_photo().await?);
            }
            Effect::Pull => {
                let path = self.remote_photo.clone().ok_or_else(|| DeviceError::PullFailed {
                    reason: "no photo located".to_string(),
                })?;
                let bytes = self
                    .bridge
                    .pull_file(&self.device.serial, &path, self.options.command_timeout)
                    .await
                    .map_err(DeviceError::from_retrieval)?;
                debug!(serial = %self.device.serial, %path, size = bytes.len(), "Photo pulled");
                self.pulled = Some(bytes);

                if let Err(e) = self
                    .bridge
                    .delete_file(&self.device.serial, &path, self.options.command_timeout)
                    .await
                {
                    warn!(serial = %self.device.serial, %path, error = %e, "Photo deletion failed");
                }
            }
            Effect::Decode => {
                let bytes = self.pulled.take().unwrap_or_default();
                let image = image_ops::inspect(
                    &self.device.serial,
                    &self.device.position.label,
                    bytes,
                )?;
                self.image = Some(image);
            }
        }
        Ok(())
    }

    /// Poll the photo directory for the newest JPEG.
    async fn locate_latest_photo(&self) -> Result<String, DeviceError> {
        let dir = &self.profile.photo_location;
        let lookup = self.profile.photo_lookup;
        let command = format!("ls -t {dir}/*.jpg 2>/dev/null | head -1");

        for attempt in 1..=lookup.attempts {
            let listing = match self
                .bridge
                .run_command(&self.device.serial, &command, self.options.command_timeout)
                .await
            {
                Ok(out) => out,
                // An empty glob makes `ls` exit non-zero; keep polling.
                Err(BridgeError::CommandFailed { .. }) => String::new(),
                Err(e) => return Err(DeviceError::from_retrieval(e)),
            };

            if let Some(path) = listing.lines().map(str::trim).find(|l| !l.is_empty()) {
                validate_remote_path("photo", path).map_err(|e| DeviceError::PullFailed {
                    reason: e.to_string(),
                })?;
                trace!(serial = %self.device.serial, path, attempt, "Photo located");
                return Ok(path.to_string());
            }
            if attempt < lookup.attempts {
                tokio::time::sleep(lookup.interval).await;
            }
        }

        Err(DeviceError::PullFailed {
            reason: format!(
                "no photo appeared in {dir} after {} lookups",
                lookup.attempts
            ),
        })
    }

    /// Close the camera app and turn the screen off. Failures are logged.
    async fn release(&self) {
        release_app(
            self.bridge.as_ref(),
            &self.device.serial,
            &self.profile.package,
            self.options.command_timeout,
        )
        .await;
    }

    async fn shell(&self, command: &str, check: Check) -> Result<String, DeviceError> {
        match self
            .bridge
            .run_command(&self.device.serial, command, self.options.command_timeout)
            .await
        {
            Ok(out) => Ok(out),
            Err(BridgeError::CommandFailed { status, stderr, .. }) if check == Check::Tolerant => {
                debug!(serial = %self.device.serial, command, status, %stderr, "Ignoring non-zero exit");
                Ok(String::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}

async fn release_app(bridge: &dyn BridgeClient, serial: &str, package: &str, timeout: Duration) {
    let stop = format!("am force-stop {package}");
    for command in [stop.as_str(), "input keyevent KEYCODE_POWER"] {
        match bridge.run_command(serial, command, timeout).await {
            Ok(_) => {}
            Err(BridgeError::CommandFailed { status, stderr, .. }) => {
                debug!(serial, command, status, %stderr, "Ignoring non-zero exit");
            }
            Err(e) => warn!(serial, command, error = %e, "Release step failed"),
        }
    }
}

/// Releases the camera app from a detached task if a capture is dropped
/// before it could release normally, as when a session deadline aborts it.
struct ReleaseGuard {
    armed: Option<(Arc<dyn BridgeClient>, String, String, Duration)>,
}

impl ReleaseGuard {
    fn arm(machine: &CameraStateMachine) -> Self {
        Self {
            armed: Some((
                Arc::clone(&machine.bridge),
                machine.device.serial.clone(),
                machine.profile.package.clone(),
                machine.options.command_timeout,
            )),
        }
    }

    fn disarm(mut self) {
        self.armed = None;
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let Some((bridge, serial, package, timeout)) = self.armed.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(%serial, "Capture interrupted; releasing in background");
                handle.spawn(async move {
                    release_app(bridge.as_ref(), &serial, &package, timeout).await;
                });
            }
            Err(_) => warn!(%serial, "Capture interrupted outside a runtime; camera app left open"),
        }
    }
}

async fn settle(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
