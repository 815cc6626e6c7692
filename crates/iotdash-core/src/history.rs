//! Sensor history tracking across snapshots.

use std::collections::BTreeMap;

use iotdash_types::{DeviceKind, DeviceTree, SensorHistory};

/// Keeps a [`SensorHistory`] per sensor key, fed from successive snapshots.
///
/// A sample is appended only when a sensor's value differs from its latest
/// sample, so repeated snapshots do not flatten the chart. Histories of
/// sensors missing from a snapshot are dropped.
#[derive(Debug, Clone, Default)]
pub struct HistoryTracker {
    histories: BTreeMap<String, SensorHistory>,
}

impl HistoryTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the sensor values of `tree`.
    pub fn observe(&mut self, tree: &DeviceTree) {
        self.histories
            .retain(|key, _| tree.get(key).is_some_and(|d| d.kind() == DeviceKind::Sensor));

        for (key, device) in tree.sensors() {
            let value = device.value();
            let history = self.histories.entry(key.to_string()).or_default();
            if history.latest().is_none_or(|s| s.value != value) {
                history.record(value);
            }
        }
    }

    /// History of the sensor `key`.
    pub fn get(&self, key: &str) -> Option<&SensorHistory> {
        self.histories.get(key)
    }

    /// All tracked sensors.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SensorHistory)> {
        self.histories.iter().map(|(k, h)| (k.as_str(), h))
    }

    /// Number of tracked sensors.
    pub fn len(&self) -> usize {
        self.histories.len()
    }

    /// Returns `true` if no sensors are tracked.
    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    /// Forget all histories.
    pub fn clear(&mut self) {
        self.histories.clear();
    }
}
