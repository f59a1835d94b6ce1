//! Pure transition logic for the per-device capture lifecycle.
//!
//! ```text
//! Idle → Waking → Unlocking → LaunchingApp → Zooming → Primed
//! Primed → Triggering → Saving → Pulling → Decoding → Done
//! any in-progress state → Failed(reason)
//! ```
//!
//! [`transition`] performs no I/O. The driver in the parent module executes
//! the returned [`Effect`] and feeds the result back as an [`Event`].

use std::fmt;

use crate::error::DeviceError;

/// Lifecycle state of one device's machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraState {
    Idle,
    Waking,
    Unlocking,
    LaunchingApp,
    Zooming,
    Primed,
    Triggering,
    Saving,
    Pulling,
    Decoding,
    Done,
    Failed(DeviceError),
}

impl CameraState {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Waking => "waking",
            Self::Unlocking => "unlocking",
            Self::LaunchingApp => "launching_app",
            Self::Zooming => "zooming",
            Self::Primed => "primed",
            Self::Triggering => "triggering",
            Self::Saving => "saving",
            Self::Pulling => "pulling",
            Self::Decoding => "decoding",
            Self::Done => "done",
            Self::Failed(_) => "failed",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    pub const fn is_primed(&self) -> bool {
        matches!(self, Self::Primed)
    }

    /// A step is running and a step result is expected next.
    pub const fn is_in_progress(&self) -> bool {
        matches!(
            self,
            Self::Waking
                | Self::Unlocking
                | Self::LaunchingApp
                | Self::Zooming
                | Self::Triggering
                | Self::Saving
                | Self::Pulling
                | Self::Decoding
        )
    }
}

impl fmt::Display for CameraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Input to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Prime,
    Capture,
    StepSucceeded,
    StepFailed(DeviceError),
}

impl Event {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Prime => "prime",
            Self::Capture => "capture",
            Self::StepSucceeded => "step_succeeded",
            Self::StepFailed(_) => "step_failed",
        }
    }
}

/// Side effect the driver must perform after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    Wake,
    Unlock,
    LaunchApp,
    Zoom,
    Trigger,
    AwaitSave,
    Pull,
    Decode,
}

impl Effect {
    /// Prime-phase effects are idempotent and may be retried.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Wake | Self::Unlock | Self::LaunchApp | Self::Zoom)
    }
}

/// Static knobs that change the transition graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionOptions {
    pub skip_zoom: bool,
}

/// Compute the next state and the effect to run.
///
/// # Errors
///
/// Returns [`DeviceError::InvalidTransition`] when `event` is not accepted
/// in `state`; the caller keeps its current state.
pub fn transition(
    state: &CameraState,
    event: Event,
    options: TransitionOptions,
) -> Result<(CameraState, Effect), DeviceError> {
    use CameraState as S;

    let next = match (state, event) {
        (S::Idle, Event::Prime) => (S::Waking, Effect::Wake),
        (S::Primed, Event::Prime) => (S::Primed, Effect::None),
        (S::Primed, Event::Capture) => (S::Triggering, Effect::Trigger),

        (s, Event::StepFailed(reason)) if s.is_in_progress() => (S::Failed(reason), Effect::None),

        (S::Waking, Event::StepSucceeded) => (S::Unlocking, Effect::Unlock),
        (S::Unlocking, Event::StepSucceeded) => (S::LaunchingApp, Effect::LaunchApp),
        (S::LaunchingApp, Event::StepSucceeded) if options.skip_zoom => (S::Primed, Effect::None),
        (S::LaunchingApp, Event::StepSucceeded) => (S::Zooming, Effect::Zoom),
        (S::Zooming, Event::StepSucceeded) => (S::Primed, Effect::None),

        (S::Triggering, Event::StepSucceeded) => (S::Saving, Effect::AwaitSave),
        (S::Saving, Event::StepSucceeded) => (S::Pulling, Effect::Pull),
        (S::Pulling, Event::StepSucceeded) => (S::Decoding, Effect::Decode),
        (S::Decoding, Event::StepSucceeded) => (S::Done, Effect::None),

        (s, e) => {
            return Err(DeviceError::InvalidTransition {
                state: s.name().to_string(),
                event: e.name().to_string(),
            });
        }
    };
    Ok(next)
}
