//! Discovery and state synchronization.
//!
//! The engine is a pure state machine: it takes datagrams in and hands back
//! the datagrams to send and the events to emit. It never touches a socket,
//! which keeps the handshake and diffing logic testable without a network.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use log::{debug, warn};
use serde_json::Value;

use crate::config::SystemConfig;
use crate::device::{DiscoveredDevice, HandshakeState};
use crate::events::LanEvent;
use crate::network::NetworkIdentity;
use crate::payload::{self, Inbound, Payload, normalize_mac};
use crate::status::DeviceState;

/// Something the engine wants done as a result of a datagram or command.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Action {
    /// Unicast a message to a device.
    Send { message: Value, to: Ipv4Addr },
    /// Deliver an event to subscribers.
    Emit(LanEvent),
}

/// Tracks every device that answered the configuration request.
#[derive(Debug)]
pub(crate) struct SyncEngine {
    identity: NetworkIdentity,
    devices: HashMap<String, DiscoveredDevice>,
}

impl SyncEngine {
    pub fn new(identity: NetworkIdentity) -> Self {
        SyncEngine {
            identity,
            devices: HashMap::new(),
        }
    }

    pub fn identity(&self) -> &NetworkIdentity {
        &self.identity
    }

    pub fn device(&self, hardware_id: &str) -> Option<&DiscoveredDevice> {
        self.devices.get(&normalize_mac(hardware_id))
    }

    pub fn devices(&self) -> impl Iterator<Item = &DiscoveredDevice> {
        self.devices.values()
    }

    pub fn handshake_state(&self, hardware_id: &str) -> HandshakeState {
        self.device(hardware_id)
            .map_or(HandshakeState::Unregistered, DiscoveredDevice::handshake)
    }

    /// Forget every device.
    pub fn clear(&mut self) {
        self.devices.clear();
    }

    /// Process one datagram received from `from`.
    pub fn handle_datagram(&mut self, data: &[u8], from: Ipv4Addr) -> Vec<Action> {
        if from == self.identity.address {
            return Vec::new();
        }

        match Inbound::parse(data) {
            Ok(inbound) => self.handle_message(inbound, from),
            Err(e) => {
                warn!("Dropping malformed datagram from {}: {}", from, e);
                Vec::new()
            }
        }
    }

    /// Build the `setPilot` command for a known device.
    pub fn command(&self, hardware_id: &str, payload: &Payload) -> Option<Action> {
        let Some(device) = self.device(hardware_id) else {
            debug!("Ignoring command for unknown device {}", hardware_id);
            return None;
        };

        match payload::set_pilot(payload) {
            Ok(message) => Some(Action::Send {
                message,
                to: device.address(),
            }),
            Err(e) => {
                warn!("Failed to build command for {}: {}", hardware_id, e);
                None
            }
        }
    }

    fn handle_message(&mut self, inbound: Inbound, from: Ipv4Addr) -> Vec<Action> {
        let known = inbound
            .mac
            .as_ref()
            .is_some_and(|mac| self.devices.contains_key(mac));

        if !known {
            return match inbound.method.as_str() {
                "registration" => vec![Action::Send {
                    message: payload::get_system_config(),
                    to: from,
                }],
                "getSystemConfig" => self.handle_system_config(inbound, from),
                _ => Vec::new(),
            };
        }

        match inbound.method.as_str() {
            "syncPilot" | "getPilot" => self.handle_state_report(inbound, from),
            _ => Vec::new(),
        }
    }

    fn handle_system_config(&mut self, inbound: Inbound, from: Ipv4Addr) -> Vec<Action> {
        let (Some(mac), Some(payload)) = (inbound.mac, inbound.payload) else {
            debug!("System config from {} without hardware id", from);
            return Vec::new();
        };

        let config: SystemConfig = match serde_json::from_value(Value::Object(payload)) {
            Ok(config) => config,
            Err(e) => {
                warn!("Invalid system config from {}: {}", from, e);
                return Vec::new();
            }
        };
        let Some(module_name) = config.module_name.filter(|name| !name.is_empty()) else {
            warn!("System config from {} has no module name", from);
            return Vec::new();
        };

        let device = DiscoveredDevice::configured(mac.clone(), from, module_name, config.fw_version);
        debug!(
            "Configured {} at {} as {:?}",
            mac,
            from,
            device.name().unwrap_or("unknown device")
        );
        self.devices.insert(mac, device);

        vec![Action::Send {
            message: payload::get_pilot(),
            to: from,
        }]
    }

    fn handle_state_report(&mut self, inbound: Inbound, from: Ipv4Addr) -> Vec<Action> {
        let (Some(mac), Some(payload)) = (inbound.mac, inbound.payload) else {
            return Vec::new();
        };
        let Some(device) = self.devices.get_mut(&mac) else {
            return Vec::new();
        };

        device.set_address(from);
        let state = DeviceState::from_report(payload);

        if device.handshake() != HandshakeState::Synced {
            device.replace_state(state);
            return vec![Action::Emit(LanEvent::Discover {
                hardware_id: mac,
                device: device.clone(),
            })];
        }

        let Some(changes) = device.state().and_then(|old| old.diff(&state)) else {
            return Vec::new();
        };
        device.replace_state(state.clone());
        vec![Action::Emit(LanEvent::StateChange {
            hardware_id: mac,
            changes,
            state,
        })]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Feature;
    use serde_json::json;

    const BULB: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);
    const SELF: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 2);
    const MAC: &str = "A8BB50000001";

    fn engine() -> SyncEngine {
        SyncEngine::new(NetworkIdentity {
            address: SELF,
            hardware_id: "AABBCCDDEEFF".to_string(),
        })
    }

    fn datagram(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    fn registration() -> Vec<u8> {
        datagram(json!({"method": "registration", "result": {"mac": "a8bb50000001", "success": true}}))
    }

    fn system_config(module: &str) -> Vec<u8> {
        datagram(json!({
            "method": "getSystemConfig",
            "env": "pro",
            "result": {"mac": "a8bb50000001", "moduleName": module, "fwVersion": "1.25.0"},
        }))
    }

    fn pilot(method: &str, state: Value) -> Vec<u8> {
        let mut params = json!({"mac": "a8bb50000001", "rssi": -58, "src": "udp"});
        params
            .as_object_mut()
            .unwrap()
            .extend(state.as_object().unwrap().clone());
        datagram(json!({"method": method, "params": params}))
    }

    fn synced_engine(state: Value) -> SyncEngine {
        let mut engine = engine();
        engine.handle_datagram(&system_config("ESP01_SHRGB1C_31"), BULB);
        engine.handle_datagram(&pilot("getPilot", state), BULB);
        engine
    }

    #[test]
    fn test_registration_requests_config_once() {
        let mut engine = engine();
        let actions = engine.handle_datagram(&registration(), BULB);
        assert_eq!(
            actions,
            vec![Action::Send {
                message: json!({"method": "getSystemConfig", "params": {}}),
                to: BULB,
            }]
        );
        assert_eq!(engine.handshake_state(MAC), HandshakeState::Unregistered);
        assert!(engine.device(MAC).is_none());
    }

    #[test]
    fn test_system_config_creates_device_and_requests_state() {
        let mut engine = engine();
        let actions = engine.handle_datagram(&system_config("ESP01_SHRGB1C_31"), BULB);
        assert_eq!(
            actions,
            vec![Action::Send {
                message: json!({"method": "getPilot", "params": {}}),
                to: BULB,
            }]
        );

        let device = engine.device(MAC).unwrap();
        assert_eq!(device.handshake(), HandshakeState::ConfigFetched);
        assert!(device.features().contains(&Feature::HueSaturation));
        assert!(device.features().contains(&Feature::ColorTemperature));
        assert_eq!(device.fw_version(), Some("1.25.0"));
        assert!(device.state().is_none());
    }

    #[test]
    fn test_config_without_module_name_is_dropped() {
        let mut engine = engine();
        let msg = datagram(json!({"method": "getSystemConfig", "result": {"mac": MAC}}));
        assert!(engine.handle_datagram(&msg, BULB).is_empty());
        assert!(engine.device(MAC).is_none());
    }

    #[test]
    fn test_config_with_empty_module_name_is_dropped() {
        let mut engine = engine();
        assert!(engine.handle_datagram(&system_config(""), BULB).is_empty());
        assert!(engine.device(MAC).is_none());
        assert_eq!(engine.handshake_state(MAC), HandshakeState::Unregistered);
    }

    #[test]
    fn test_repeated_config_does_not_recompute_profile() {
        let mut engine = engine();
        engine.handle_datagram(&system_config("ESP01_SHRGB1C_31"), BULB);
        let actions = engine.handle_datagram(&system_config("ESP10_SOCKET_01"), BULB);
        assert!(actions.is_empty());
        assert_eq!(engine.device(MAC).unwrap().name(), Some("Wiz RGB Bulb"));
        assert_eq!(engine.devices().count(), 1);
    }

    #[test]
    fn test_registration_from_known_device_is_ignored() {
        let mut engine = synced_engine(json!({"state": true}));
        assert!(engine.handle_datagram(&registration(), BULB).is_empty());
    }

    #[test]
    fn test_first_report_discovers_once() {
        let mut engine = engine();
        engine.handle_datagram(&system_config("ESP01_SHRGB1C_31"), BULB);

        let actions =
            engine.handle_datagram(&pilot("getPilot", json!({"state": true, "dimming": 50})), BULB);
        let [Action::Emit(LanEvent::Discover { hardware_id, device })] = actions.as_slice() else {
            panic!("expected a discover event, got {actions:?}");
        };
        assert_eq!(hardware_id, MAC);
        assert_eq!(device.handshake(), HandshakeState::Synced);
        let state = device.state().unwrap();
        assert_eq!(state.len(), 2);
        assert!(!state.contains_key("rssi"));

        // Same state again: nothing
        let actions =
            engine.handle_datagram(&pilot("syncPilot", json!({"state": true, "dimming": 50})), BULB);
        assert!(actions.is_empty());
    }

    #[test]
    fn test_changed_report_emits_state_change() {
        let mut engine = synced_engine(json!({"state": true, "dimming": 50}));

        let actions =
            engine.handle_datagram(&pilot("syncPilot", json!({"state": true, "dimming": 75})), BULB);
        let [Action::Emit(LanEvent::StateChange { changes, state, .. })] = actions.as_slice() else {
            panic!("expected a state change, got {actions:?}");
        };
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.dimming(), Some(75));
        assert_eq!(state.len(), 2);
        assert_eq!(engine.device(MAC).unwrap().state(), Some(state));

        // A second change is diffed against the replaced state
        let actions =
            engine.handle_datagram(&pilot("syncPilot", json!({"state": false, "dimming": 75})), BULB);
        let [Action::Emit(LanEvent::StateChange { changes, .. })] = actions.as_slice() else {
            panic!("expected a state change, got {actions:?}");
        };
        assert_eq!(changes.is_on(), Some(false));
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_color_change_reports_full_tuple() {
        let mut engine = synced_engine(json!({"r": 10, "g": 10, "b": 10, "w": 10}));
        let actions = engine.handle_datagram(
            &pilot("syncPilot", json!({"r": 20, "g": 10, "b": 10, "w": 10})),
            BULB,
        );
        let [Action::Emit(LanEvent::StateChange { changes, .. })] = actions.as_slice() else {
            panic!("expected a state change, got {actions:?}");
        };
        for channel in ["r", "g", "b", "w"] {
            assert!(changes.contains_key(channel), "missing {channel}");
        }
    }

    #[test]
    fn test_report_before_config_is_ignored() {
        let mut engine = engine();
        let actions = engine.handle_datagram(&pilot("syncPilot", json!({"state": true})), BULB);
        assert!(actions.is_empty());
        assert!(engine.device(MAC).is_none());
    }

    #[test]
    fn test_self_echo_is_dropped() {
        let mut engine = engine();
        assert!(engine.handle_datagram(&registration(), SELF).is_empty());
        assert!(engine
            .handle_datagram(&system_config("ESP01_SHRGB1C_31"), SELF)
            .is_empty());
        assert!(engine.device(MAC).is_none());
    }

    #[test]
    fn test_malformed_datagram_is_dropped() {
        let mut engine = engine();
        assert!(engine.handle_datagram(b"test", BULB).is_empty());
        assert!(engine.handle_datagram(b"{\"method\":", BULB).is_empty());
    }

    #[test]
    fn test_address_follows_latest_report() {
        let mut engine = synced_engine(json!({"state": true}));
        let moved = Ipv4Addr::new(192, 168, 1, 99);
        engine.handle_datagram(&pilot("syncPilot", json!({"state": true})), moved);
        assert_eq!(engine.device(MAC).unwrap().address(), moved);
    }

    #[test]
    fn test_command_to_known_and_unknown_device() {
        let engine = synced_engine(json!({"state": true}));
        let mut payload = Payload::new();
        payload.on(false);

        let Some(Action::Send { message, to }) = engine.command("a8:bb:50:00:00:01", &payload)
        else {
            panic!("expected a command");
        };
        assert_eq!(to, BULB);
        assert_eq!(message["method"], "setPilot");
        assert_eq!(message["params"]["state"], false);
        assert_eq!(message["params"]["src"], "mb");

        assert!(engine.command("000000000000", &payload).is_none());
    }

    #[test]
    fn test_clear_forgets_devices() {
        let mut engine = synced_engine(json!({"state": true}));
        engine.clear();
        assert_eq!(engine.handshake_state(MAC), HandshakeState::Unregistered);
    }
}
