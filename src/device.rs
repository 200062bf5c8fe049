//! Devices known to the sync engine.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::config::{DeviceProfile, Feature};
use crate::status::DeviceState;
use crate::types::ColorRGBW;

/// Where a device is in the registration → config → state handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeState {
    /// Seen (or not) on the network, but no configuration reply yet.
    Unregistered,
    /// Configuration known; waiting for the first state report.
    ConfigFetched,
    /// At least one state report received.
    Synced,
}

/// A physical device identified by its hardware id.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredDevice {
    hardware_id: String,
    address: Ipv4Addr,
    module_name: String,
    fw_version: Option<String>,
    profile: DeviceProfile,
    handshake: HandshakeState,
    state: Option<DeviceState>,
}

impl DiscoveredDevice {
    /// A device whose configuration reply just arrived.
    pub(crate) fn configured(
        hardware_id: String,
        address: Ipv4Addr,
        module_name: String,
        fw_version: Option<String>,
    ) -> Self {
        DiscoveredDevice {
            profile: DeviceProfile::from_module_name(&module_name),
            hardware_id,
            address,
            module_name,
            fw_version,
            handshake: HandshakeState::ConfigFetched,
            state: None,
        }
    }

    pub fn hardware_id(&self) -> &str {
        &self.hardware_id
    }

    /// Last source address seen for this device.
    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn fw_version(&self) -> Option<&str> {
        self.fw_version.as_deref()
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Display name derived from the module name.
    pub fn name(&self) -> Option<&str> {
        self.profile.name.as_deref()
    }

    pub fn features(&self) -> &[Feature] {
        &self.profile.features
    }

    pub fn handshake(&self) -> HandshakeState {
        self.handshake
    }

    /// Last reported state; `None` until the device is synced.
    pub fn state(&self) -> Option<&DeviceState> {
        self.state.as_ref()
    }

    /// Last reported color, if the device reported all four channels.
    pub fn rgbw(&self) -> Option<ColorRGBW> {
        self.state.as_ref().and_then(ColorRGBW::from_state)
    }

    pub(crate) fn set_address(&mut self, address: Ipv4Addr) {
        self.address = address;
    }

    /// Replace the state wholesale and mark the device synced.
    pub(crate) fn replace_state(&mut self, state: DeviceState) {
        self.state = Some(state);
        self.handshake = HandshakeState::Synced;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bulb() -> DiscoveredDevice {
        DiscoveredDevice::configured(
            "A8BB50000001".to_string(),
            Ipv4Addr::new(192, 168, 1, 20),
            "ESP01_SHRGB1C_31".to_string(),
            Some("1.25.0".to_string()),
        )
    }

    #[test]
    fn test_configured_device() {
        let device = bulb();
        assert_eq!(device.handshake(), HandshakeState::ConfigFetched);
        assert_eq!(device.name(), Some("Wiz RGB Bulb"));
        assert!(device.features().contains(&Feature::HueSaturation));
        assert!(device.state().is_none());
        assert!(device.rgbw().is_none());
    }

    #[test]
    fn test_replace_state_syncs() {
        let mut device = bulb();
        let state = DeviceState::try_from(json!({"r": 1, "g": 2, "b": 3, "w": 4})).unwrap();
        device.replace_state(state);
        assert_eq!(device.handshake(), HandshakeState::Synced);
        assert_eq!(device.rgbw(), Some(ColorRGBW::new(1, 2, 3, 4)));
    }

    #[test]
    fn test_serialize_omits_missing_state() {
        let value = serde_json::to_value(bulb()).unwrap();
        assert_eq!(value["moduleName"], "ESP01_SHRGB1C_31");
        assert_eq!(value["handshake"], "ConfigFetched");
        assert!(value.get("state").is_none());
    }
}
