//! Cross-request store of primed machines.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::machine::CameraStateMachine;

/// Most recent `Primed` machine per serial.
///
/// Entries have no TTL. `take` removes the entry in the same critical
/// section that reads it, so two sessions can never both reuse one machine.
#[derive(Default)]
pub struct SessionCache {
    machines: Mutex<HashMap<String, CameraStateMachine>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CameraStateMachine>> {
        self.machines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a primed machine, returning the entry it replaced.
    ///
    /// # Errors
    ///
    /// A machine that is not `Primed` is handed back unchanged.
    pub fn insert(
        &self,
        machine: CameraStateMachine,
    ) -> Result<Option<CameraStateMachine>, CameraStateMachine> {
        if !machine.is_primed() {
            trace!(serial = machine.serial(), state = %machine.state(), "Refusing to cache unprimed machine");
            return Err(machine);
        }
        let serial = machine.serial().to_string();
        debug!(%serial, "Caching primed machine");
        Ok(self.lock().insert(serial, machine))
    }

    /// Remove and return the machine for `serial`.
    pub fn take(&self, serial: &str) -> Option<CameraStateMachine> {
        let machine = self.lock().remove(serial);
        trace!(serial, hit = machine.is_some(), "Cache take");
        machine
    }

    pub fn contains(&self, serial: &str) -> bool {
        self.lock().contains_key(serial)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Cached serials, sorted.
    pub fn serials(&self) -> Vec<String> {
        let mut serials: Vec<String> = self.lock().keys().cloned().collect();
        serials.sort();
        serials
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
