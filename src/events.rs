//! Events delivered to subscribers of a [`crate::LanComm`].

use crate::device::DiscoveredDevice;
use crate::status::DeviceState;

/// Something the engine observed on the network.
#[derive(Debug, Clone, PartialEq)]
pub enum LanEvent {
    /// First state report of a device. The device carries its full state.
    Discover {
        hardware_id: String,
        device: DiscoveredDevice,
    },
    /// A later report that differs from the previous one.
    StateChange {
        hardware_id: String,
        changes: DeviceState,
        state: DeviceState,
    },
    /// The engine was ended; no further events follow.
    End,
}

impl LanEvent {
    pub fn hardware_id(&self) -> Option<&str> {
        match self {
            LanEvent::Discover { hardware_id, .. } | LanEvent::StateChange { hardware_id, .. } => {
                Some(hardware_id)
            }
            LanEvent::End => None,
        }
    }
}
