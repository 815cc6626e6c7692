//! Platform-agnostic types for iotdash device trees.
//!
//! This crate holds the data model shared by the sync client
//! (iotdash-core) and the command-line dashboard (iotdash-cli).
//!
//! # Features
//!
//! - [`Device`] sum type for switches, dimmers and sensors
//! - [`DeviceTree`] mirror of the remote key → device mapping
//! - Key normalization for user-entered device names
//! - Connection configuration and activity log entries
//! - Bounded per-sensor [`SensorHistory`]
//!
//! # Example
//!
//! ```
//! use iotdash_types::{Device, DeviceTree, normalize_key};
//!
//! let mut tree = DeviceTree::new();
//! tree.insert(normalize_key("Ceiling Fan"), Device::dimmer(1024.0, "RPM"));
//! assert!(tree.contains_key("ceiling_fan"));
//! ```

pub mod device;
pub mod error;
pub mod history;
pub mod session;

pub use device::{
    DEFAULT_DIMMER_LIMIT, DEFAULT_DIMMER_UNIT, DEFAULT_SENSOR_LIMIT, DEFAULT_SENSOR_UNIT,
    DEFAULT_UPPER_LIMIT, Device, DeviceKind, DeviceTree, SkippedEntry, SwitchState, device_key,
    normalize_key, validate_key,
};
pub use error::{ParseError, ParseResult};
pub use history::{HistorySample, MAX_HISTORY_SAMPLES, SensorHistory};
pub use session::{ConnectionConfig, DEFAULT_TREE_PATH, LogEntry, Severity};
