//! Demo command implementation.
//!
//! Runs the dashboard against an in-memory tree seeded with a few devices,
//! so the CLI can be tried without a database.

use std::sync::Arc;

use anyhow::Result;

use iotdash_core::{MemoryConnector, MemoryTree, SimulationParams, SyncStore};
use iotdash_types::{ConnectionConfig, DEFAULT_TREE_PATH, Device, DeviceTree, SwitchState};

use crate::format::FormatOptions;

use super::{cmd_simulate, cmd_watch};

const DEMO_URL: &str = "https://demo.iotdash.local";

/// Devices the demo tree starts with.
pub fn demo_devices() -> DeviceTree {
    let mut devices = DeviceTree::new();
    devices.insert(
        "lamp",
        Device::Switch {
            value: SwitchState::On,
        },
    );
    devices.insert("water_pump", Device::switch());
    devices.insert("ceiling_fan", Device::dimmer(1024.0, "RPM").with_value(512.0));
    devices.insert("humidity", Device::sensor(100.0, "%").with_value(45.0));
    devices.insert("temperature", Device::sensor(50.0, "°C").with_value(22.5));
    devices
}

/// Run the demo dashboard, with the simulator unless `params` is `None`.
pub async fn cmd_demo(params: Option<SimulationParams>, opts: FormatOptions) -> Result<()> {
    let tree = Arc::new(MemoryTree::with_devices(DEFAULT_TREE_PATH, &demo_devices()));
    let store = SyncStore::new(MemoryConnector::with_tree(tree));
    let config = ConnectionConfig::new(DEMO_URL, "");

    match params {
        Some(params) => cmd_simulate(&store, config, params, opts).await,
        None => cmd_watch(&store, config, opts).await,
    }
}
