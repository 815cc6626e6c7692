//! Device model: switches, dimmers and sensors, and the tree that holds them.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};

/// Ceiling substituted when a dimmer or sensor has no usable `upper_limit`.
pub const DEFAULT_UPPER_LIMIT: f64 = 100.0;

/// Default ceiling for newly created sensors.
pub const DEFAULT_SENSOR_LIMIT: f64 = 100.0;

/// Default ceiling for newly created dimmers.
pub const DEFAULT_DIMMER_LIMIT: f64 = 1024.0;

/// Default unit for newly created sensors.
pub const DEFAULT_SENSOR_UNIT: &str = "%";

/// Default unit for newly created dimmers.
pub const DEFAULT_DIMMER_UNIT: &str = "RPM";

/// Characters the remote tree does not accept inside a path segment.
const FORBIDDEN_KEY_CHARS: &[char] = &['.', '$', '#', '[', ']', '/'];

/// Binary state of a switch.
///
/// Serialized as the integers `0` and `1`, which is how the remote tree
/// stores switch values. Decoding is lenient: `1`, `1.0` and `true` read as
/// on, anything else reads as off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "serde_json::Value", into = "u8"))]
pub enum SwitchState {
    /// Actuator off (`0`).
    #[default]
    Off,
    /// Actuator on (`1`).
    On,
}

impl SwitchState {
    /// Returns `true` if the switch is on.
    #[must_use]
    pub fn is_on(self) -> bool {
        matches!(self, SwitchState::On)
    }

    /// The opposite state.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            SwitchState::Off => SwitchState::On,
            SwitchState::On => SwitchState::Off,
        }
    }

    /// The numeric value written to the remote tree.
    #[must_use]
    pub fn as_value(self) -> f64 {
        f64::from(u8::from(self))
    }
}

impl From<bool> for SwitchState {
    fn from(on: bool) -> Self {
        if on { SwitchState::On } else { SwitchState::Off }
    }
}

impl From<SwitchState> for u8 {
    fn from(state: SwitchState) -> Self {
        match state {
            SwitchState::Off => 0,
            SwitchState::On => 1,
        }
    }
}

impl From<serde_json::Value> for SwitchState {
    fn from(value: serde_json::Value) -> Self {
        let on = match value {
            serde_json::Value::Bool(on) => on,
            serde_json::Value::Number(n) => n.as_f64() == Some(1.0),
            _ => false,
        };
        SwitchState::from(on)
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchState::Off => write!(f, "OFF"),
            SwitchState::On => write!(f, "ON"),
        }
    }
}

/// Kind of device, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DeviceKind {
    /// Binary actuator.
    Switch,
    /// Bounded analog actuator.
    Dimmer,
    /// Bounded analog reading.
    Sensor,
}

impl DeviceKind {
    /// The tag used for this kind in the remote tree.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::Switch => "switch",
            DeviceKind::Dimmer => "dimmer",
            DeviceKind::Sensor => "sensor",
        }
    }

    /// Whether devices of this kind carry a value bounded by an upper limit.
    #[must_use]
    pub fn is_bounded(self) -> bool {
        !matches!(self, DeviceKind::Switch)
    }
}

impl FromStr for DeviceKind {
    type Err = ParseError;

    /// Parse a kind from its tag (case-insensitive).
    ///
    /// ```
    /// use iotdash_types::DeviceKind;
    ///
    /// assert_eq!("Dimmer".parse::<DeviceKind>(), Ok(DeviceKind::Dimmer));
    /// assert!("relay".parse::<DeviceKind>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "switch" => Ok(DeviceKind::Switch),
            "dimmer" => Ok(DeviceKind::Dimmer),
            "sensor" => Ok(DeviceKind::Sensor),
            other => Err(ParseError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device in the remote tree.
///
/// The variants carry structurally different fields: a switch has no unit or
/// limit, dimmers and sensors always have a unit and may have an explicit
/// `upper_limit`. The serialized form is internally tagged on `"type"`:
///
/// ```json
/// { "type": "switch", "value": 1 }
/// { "type": "dimmer", "value": 512, "upper_limit": 1024, "unit": "RPM" }
/// { "type": "sensor", "value": 21.5, "upper_limit": 50, "unit": "°C" }
/// ```
///
/// A missing `upper_limit` is kept as `None` so the record is never rewritten
/// with a limit the remote side did not choose; [`Device::upper_limit`]
/// substitutes [`DEFAULT_UPPER_LIMIT`] for computation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "lowercase"))]
pub enum Device {
    /// Binary actuator.
    Switch {
        /// Current state.
        #[cfg_attr(feature = "serde", serde(default))]
        value: SwitchState,
    },
    /// Bounded analog actuator, `0 <= value <= upper_limit`.
    Dimmer {
        /// Current setting.
        #[cfg_attr(feature = "serde", serde(default))]
        value: f64,
        /// Ceiling as stored remotely, if any.
        #[cfg_attr(
            feature = "serde",
            serde(default, skip_serializing_if = "Option::is_none")
        )]
        upper_limit: Option<f64>,
        /// Display unit.
        #[cfg_attr(feature = "serde", serde(default))]
        unit: String,
    },
    /// Bounded analog reading, `0 <= value <= upper_limit`.
    Sensor {
        /// Latest reading.
        #[cfg_attr(feature = "serde", serde(default))]
        value: f64,
        /// Ceiling as stored remotely, if any.
        #[cfg_attr(
            feature = "serde",
            serde(default, skip_serializing_if = "Option::is_none")
        )]
        upper_limit: Option<f64>,
        /// Display unit.
        #[cfg_attr(feature = "serde", serde(default))]
        unit: String,
    },
}

impl Device {
    /// A new switch in the off state.
    #[must_use]
    pub fn switch() -> Self {
        Device::Switch {
            value: SwitchState::Off,
        }
    }

    /// A new dimmer at zero with the given ceiling and unit.
    #[must_use]
    pub fn dimmer(upper_limit: f64, unit: impl Into<String>) -> Self {
        Device::Dimmer {
            value: 0.0,
            upper_limit: Some(upper_limit),
            unit: unit.into(),
        }
    }

    /// A new sensor at zero with the given ceiling and unit.
    #[must_use]
    pub fn sensor(upper_limit: f64, unit: impl Into<String>) -> Self {
        Device::Sensor {
            value: 0.0,
            upper_limit: Some(upper_limit),
            unit: unit.into(),
        }
    }

    /// Build a fresh device of `kind`, filling in the builder defaults.
    ///
    /// A missing, zero or non-finite limit falls back to 1024 for dimmers and
    /// 100 for sensors; a missing or blank unit falls back to `RPM` and `%`.
    /// Switch devices ignore both inputs.
    ///
    /// ```
    /// use iotdash_types::{Device, DeviceKind};
    ///
    /// let fan = Device::new_with_defaults(DeviceKind::Dimmer, None, None);
    /// assert_eq!(fan, Device::dimmer(1024.0, "RPM"));
    /// ```
    #[must_use]
    pub fn new_with_defaults(kind: DeviceKind, upper_limit: Option<f64>, unit: Option<&str>) -> Self {
        let limit = upper_limit.filter(|l| l.is_finite() && *l > 0.0);
        let unit = unit.map(str::trim).filter(|u| !u.is_empty());
        match kind {
            DeviceKind::Switch => Device::switch(),
            DeviceKind::Dimmer => Device::dimmer(
                limit.unwrap_or(DEFAULT_DIMMER_LIMIT),
                unit.unwrap_or(DEFAULT_DIMMER_UNIT),
            ),
            DeviceKind::Sensor => Device::sensor(
                limit.unwrap_or(DEFAULT_SENSOR_LIMIT),
                unit.unwrap_or(DEFAULT_SENSOR_UNIT),
            ),
        }
    }

    /// The kind of this device.
    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        match self {
            Device::Switch { .. } => DeviceKind::Switch,
            Device::Dimmer { .. } => DeviceKind::Dimmer,
            Device::Sensor { .. } => DeviceKind::Sensor,
        }
    }

    /// The current value as a number (switches report `0` or `1`).
    #[must_use]
    pub fn value(&self) -> f64 {
        match self {
            Device::Switch { value } => value.as_value(),
            Device::Dimmer { value, .. } | Device::Sensor { value, .. } => *value,
        }
    }

    /// The effective ceiling used for ranges and percentages.
    ///
    /// Switches have a ceiling of `1`. Dimmers and sensors use their stored
    /// `upper_limit` when it is finite and positive, otherwise
    /// [`DEFAULT_UPPER_LIMIT`].
    #[must_use]
    pub fn upper_limit(&self) -> f64 {
        match self {
            Device::Switch { .. } => 1.0,
            Device::Dimmer { upper_limit, .. } | Device::Sensor { upper_limit, .. } => {
                upper_limit
                    .filter(|l| l.is_finite() && *l > 0.0)
                    .unwrap_or(DEFAULT_UPPER_LIMIT)
            }
        }
    }

    /// The ceiling exactly as stored remotely, without substitution.
    #[must_use]
    pub fn stored_upper_limit(&self) -> Option<f64> {
        match self {
            Device::Switch { .. } => None,
            Device::Dimmer { upper_limit, .. } | Device::Sensor { upper_limit, .. } => {
                *upper_limit
            }
        }
    }

    /// The display unit (empty for switches).
    #[must_use]
    pub fn unit(&self) -> &str {
        match self {
            Device::Switch { .. } => "",
            Device::Dimmer { unit, .. } | Device::Sensor { unit, .. } => unit,
        }
    }

    /// The value as a rounded percentage of the effective ceiling.
    ///
    /// Never NaN: a missing or zero limit is replaced before dividing.
    ///
    /// ```
    /// use iotdash_types::Device;
    ///
    /// let sensor = Device::Sensor { value: 42.0, upper_limit: None, unit: "%".into() };
    /// assert_eq!(sensor.percentage(), 42.0);
    /// ```
    #[must_use]
    pub fn percentage(&self) -> f64 {
        let pct = (self.value() / self.upper_limit() * 100.0).round();
        if pct.is_finite() { pct } else { 0.0 }
    }

    /// Returns a copy with the value replaced.
    ///
    /// Switches treat any non-zero value as on.
    #[must_use]
    pub fn with_value(&self, new_value: f64) -> Self {
        match self {
            Device::Switch { .. } => Device::Switch {
                value: SwitchState::from(new_value != 0.0),
            },
            Device::Dimmer {
                upper_limit, unit, ..
            } => Device::Dimmer {
                value: new_value,
                upper_limit: *upper_limit,
                unit: unit.clone(),
            },
            Device::Sensor {
                upper_limit, unit, ..
            } => Device::Sensor {
                value: new_value,
                upper_limit: *upper_limit,
                unit: unit.clone(),
            },
        }
    }
}

/// Normalize a user-entered device name into a tree key.
///
/// Trims the input, lower-cases it and replaces every run of whitespace with
/// a single underscore.
///
/// ```
/// use iotdash_types::normalize_key;
///
/// assert_eq!(normalize_key("Living Room  Lamp"), "living_room_lamp");
/// assert_eq!(normalize_key("  Temp "), "temp");
/// ```
#[must_use]
pub fn normalize_key(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Check that `key` can be used as a single segment of a tree path.
pub fn validate_key(key: &str) -> ParseResult<()> {
    let invalid = |reason: &str| ParseError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("key cannot be empty"));
    }
    if let Some(c) = key.chars().find(|c| FORBIDDEN_KEY_CHARS.contains(c)) {
        return Err(invalid(&format!("character '{}' is not allowed", c)));
    }
    if key.chars().any(|c| c.is_ascii_control()) {
        return Err(invalid("control characters are not allowed"));
    }
    Ok(())
}

/// Normalize and validate a user-entered name in one step.
pub fn device_key(name: &str) -> ParseResult<String> {
    let key = normalize_key(name);
    validate_key(&key)?;
    Ok(key)
}

/// A tree entry that could not be read as a [`Device`].
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedEntry {
    /// Key of the entry.
    pub key: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Mapping from device key to [`Device`], as mirrored from the remote tree.
///
/// Ordered by key so listings are stable between deliveries.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct DeviceTree(BTreeMap<String, Device>);

impl DeviceTree {
    /// An empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the tree has no devices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up a device by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Device> {
        self.0.get(key)
    }

    /// Returns `true` if a device with `key` exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Insert or replace a device, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, device: Device) -> Option<Device> {
        self.0.insert(key.into(), device)
    }

    /// Remove a device by key.
    pub fn remove(&mut self, key: &str) -> Option<Device> {
        self.0.remove(key)
    }

    /// Iterate over `(key, device)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Device)> {
        self.0.iter().map(|(k, d)| (k.as_str(), d))
    }

    /// Iterate over devices of one kind.
    pub fn of_kind(&self, kind: DeviceKind) -> impl Iterator<Item = (&str, &Device)> {
        self.iter().filter(move |(_, d)| d.kind() == kind)
    }

    /// Iterate over switches.
    pub fn switches(&self) -> impl Iterator<Item = (&str, &Device)> {
        self.of_kind(DeviceKind::Switch)
    }

    /// Iterate over dimmers.
    pub fn dimmers(&self) -> impl Iterator<Item = (&str, &Device)> {
        self.of_kind(DeviceKind::Dimmer)
    }

    /// Iterate over sensors.
    pub fn sensors(&self) -> impl Iterator<Item = (&str, &Device)> {
        self.of_kind(DeviceKind::Sensor)
    }

    /// Number of devices of each kind, as `(switches, dimmers, sensors)`.
    #[must_use]
    pub fn counts(&self) -> (usize, usize, usize) {
        self.0
            .values()
            .fold((0, 0, 0), |(s, d, n), device| match device.kind() {
                DeviceKind::Switch => (s + 1, d, n),
                DeviceKind::Dimmer => (s, d + 1, n),
                DeviceKind::Sensor => (s, d, n + 1),
            })
    }

    /// Borrow the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &BTreeMap<String, Device> {
        &self.0
    }

    /// Consume the tree, returning the underlying map.
    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, Device> {
        self.0
    }

    /// Build a tree from a JSON subtree delivered by the remote store.
    ///
    /// `null` and non-object values yield an empty tree. Entries that do not
    /// describe a valid device are skipped and returned alongside the tree so
    /// one malformed record cannot hide the rest of the snapshot.
    #[cfg(feature = "serde")]
    #[must_use]
    pub fn from_json(value: serde_json::Value) -> (Self, Vec<SkippedEntry>) {
        let serde_json::Value::Object(entries) = value else {
            return (Self::new(), Vec::new());
        };

        let mut tree = Self::new();
        let mut skipped = Vec::new();
        for (key, raw) in entries {
            match serde_json::from_value::<Device>(raw) {
                Ok(device) => {
                    tree.0.insert(key, device);
                }
                Err(e) => skipped.push(SkippedEntry {
                    key,
                    reason: e.to_string(),
                }),
            }
        }
        (tree, skipped)
    }

    /// Serialize the tree to the JSON shape stored remotely.
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

impl FromIterator<(String, Device)> for DeviceTree {
    fn from_iter<I: IntoIterator<Item = (String, Device)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, Device>> for DeviceTree {
    fn from(map: BTreeMap<String, Device>) -> Self {
        Self(map)
    }
}

impl IntoIterator for DeviceTree {
    type Item = (String, Device);
    type IntoIter = std::collections::btree_map::IntoIter<String, Device>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
