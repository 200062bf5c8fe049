//! Device state tracking and diffing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol bookkeeping fields that are not part of a device's user-visible state.
pub(crate) const NOISE_FIELDS: [&str; 6] = ["mac", "rssi", "src", "sceneId", "mqttCd", "ts"];

/// Color channels, which are only meaningful as a complete tuple.
pub(crate) const COLOR_CHANNELS: [&str; 4] = ["r", "g", "b", "w"];

/// The flat attribute map a device reports through `getPilot` / `syncPilot`.
///
/// Keys are protocol attribute names (`state`, `dimming`, `temp`, `r`, `g`,
/// `b`, `w`, ...). A state is always replaced wholesale by the next report,
/// never merged field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceState(Map<String, Value>);

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from a raw report payload, dropping protocol noise.
    pub(crate) fn from_report(mut payload: Map<String, Value>) -> Self {
        for key in NOISE_FIELDS {
            payload.remove(key);
        }
        DeviceState(payload)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Power state, if reported.
    pub fn is_on(&self) -> Option<bool> {
        self.get("state").and_then(Value::as_bool)
    }

    /// Dimming level in percent, if reported.
    pub fn dimming(&self) -> Option<u8> {
        self.get("dimming")
            .and_then(Value::as_u64)
            .and_then(|v| u8::try_from(v).ok())
    }

    /// Color temperature in kelvin, if reported.
    pub fn temp(&self) -> Option<u16> {
        self.get("temp")
            .and_then(Value::as_u64)
            .and_then(|v| u16::try_from(v).ok())
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    /// Attributes of `newer` that differ from this state.
    ///
    /// A key is changed when it is missing here or its value differs. If any
    /// color channel changed, all four channels are reported with their values
    /// from `newer` (`null` where `newer` lacks one). Keys that disappeared in
    /// `newer` are not reported.
    ///
    /// Returns `None` when nothing changed.
    ///
    /// # Examples
    ///
    /// ```
    /// use serde_json::json;
    /// use wiz_lan::DeviceState;
    ///
    /// let old = DeviceState::try_from(json!({"state": true, "dimming": 50})).unwrap();
    /// let new = DeviceState::try_from(json!({"state": true, "dimming": 80})).unwrap();
    ///
    /// let changes = old.diff(&new).unwrap();
    /// assert_eq!(changes.len(), 1);
    /// assert_eq!(changes.dimming(), Some(80));
    /// assert!(old.diff(&old).is_none());
    /// ```
    pub fn diff(&self, newer: &DeviceState) -> Option<DeviceState> {
        let mut changes: Map<String, Value> = newer
            .iter()
            .filter(|(key, value)| self.get(key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        if changes.is_empty() {
            return None;
        }

        if COLOR_CHANNELS.iter().any(|c| changes.contains_key(*c)) {
            for channel in COLOR_CHANNELS {
                let value = newer.get(channel).cloned().unwrap_or(Value::Null);
                changes.insert(channel.to_string(), value);
            }
        }

        Some(DeviceState(changes))
    }
}

impl TryFrom<Value> for DeviceState {
    type Error = Value;

    /// Only JSON objects are states; anything else is handed back.
    fn try_from(value: Value) -> Result<Self, Value> {
        match value {
            Value::Object(map) => Ok(DeviceState(map)),
            other => Err(other),
        }
    }
}

impl From<DeviceState> for Value {
    fn from(state: DeviceState) -> Self {
        Value::Object(state.0)
    }
}
