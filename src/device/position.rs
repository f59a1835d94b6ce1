//! Position assignment strategies.
//!
//! A strategy turns the unordered set of serials reported by the bridge into
//! the ordered device list every response follows.

use std::collections::{BTreeSet, HashMap};

use tracing::{trace, warn};

use super::Device;
use crate::config::PositionEntry;

/// Orders discovered serials and labels each device.
///
/// Implementations must be deterministic: the same serial set always yields
/// the same order. The returned devices carry `position.index` equal to
/// their index in the returned vector.
pub trait PositionStrategy: Send + Sync {
    fn arrange(&self, serials: Vec<String>) -> Vec<Device>;
}

/// Default strategy: lexical serial order, labelled `device_1..N`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialOrder;

impl PositionStrategy for SerialOrder {
    fn arrange(&self, serials: Vec<String>) -> Vec<Device> {
        let sorted: BTreeSet<String> = serials.into_iter().collect();
        sorted
            .into_iter()
            .enumerate()
            .map(|(index, serial)| Device::new(serial, index, default_label(index)))
            .collect()
    }
}

/// Fixed serial → label table from config.
///
/// Mapped devices come first, in table order. Unmapped devices follow in
/// serial order and keep the default `device_K` numbering for their slot.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    entries: Vec<PositionEntry>,
}

impl MappingTable {
    pub fn new(entries: Vec<PositionEntry>) -> Self {
        let mut by_label: HashMap<&str, Vec<&str>> = HashMap::new();
        for entry in &entries {
            by_label.entry(entry.label.as_str()).or_default().push(&entry.serial);
        }
        for (label, serials) in by_label.iter().filter(|(_, s)| s.len() > 1) {
            warn!(label, ?serials, "Duplicate position label; table order decides output order");
        }
        Self { entries }
    }
}

impl PositionStrategy for MappingTable {
    fn arrange(&self, serials: Vec<String>) -> Vec<Device> {
        let mut remaining: BTreeSet<String> = serials.into_iter().collect();
        let mut devices = Vec::with_capacity(remaining.len());

        for entry in &self.entries {
            if remaining.remove(&entry.serial) {
                let index = devices.len();
                devices.push(Device::new(entry.serial.clone(), index, entry.label.clone()));
            }
        }
        for serial in remaining {
            trace!(%serial, "Serial not in position table");
            let index = devices.len();
            devices.push(Device::new(serial, index, default_label(index)));
        }
        devices
    }
}

fn default_label(index: usize) -> String {
    format!("device_{}", index + 1)
}
