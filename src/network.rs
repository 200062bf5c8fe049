//! Local network identity selection.

use std::net::Ipv4Addr;

use if_addrs::IfAddr;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

/// The address and hardware id this process announces itself with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIdentity {
    pub address: Ipv4Addr,
    /// Uppercase, delimiter-free MAC address
    pub hardware_id: String,
}

/// A non-loopback IPv4 interface of the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub address: Ipv4Addr,
    pub hardware_id: String,
}

impl From<&NetworkInterface> for NetworkIdentity {
    fn from(iface: &NetworkInterface) -> Self {
        NetworkIdentity {
            address: iface.address,
            hardware_id: iface.hardware_id.clone(),
        }
    }
}

/// List the host's non-loopback IPv4 interfaces in enumeration order.
pub fn list_interfaces() -> Result<Vec<NetworkInterface>> {
    let interfaces = if_addrs::get_if_addrs().map_err(Error::Interfaces)?;

    Ok(interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| {
            let IfAddr::V4(v4) = &iface.addr else {
                return None;
            };
            let hardware_id = match mac_address::mac_address_by_name(&iface.name) {
                Ok(Some(mac)) => hardware_id(&mac.bytes()),
                Ok(None) => hardware_id(&[0; 6]),
                Err(e) => {
                    debug!("No hardware address for {}: {}", iface.name, e);
                    hardware_id(&[0; 6])
                }
            };
            Some(NetworkInterface {
                address: v4.ip,
                name: iface.name,
                hardware_id,
            })
        })
        .collect())
}

/// Pick the interface whose address matches `preferred`, or the first one.
///
/// # Examples
///
/// ```
/// use std::net::Ipv4Addr;
/// use wiz_lan::{NetworkInterface, choose_identity};
///
/// let eth = NetworkInterface {
///     name: "eth0".into(),
///     address: Ipv4Addr::new(10, 0, 0, 2),
///     hardware_id: "001122334455".into(),
/// };
/// let identity = choose_identity(&[eth], None).unwrap();
/// assert_eq!(identity.address, Ipv4Addr::new(10, 0, 0, 2));
///
/// assert!(choose_identity(&[], None).is_err());
/// ```
pub fn choose_identity(
    candidates: &[NetworkInterface],
    preferred: Option<Ipv4Addr>,
) -> Result<NetworkIdentity> {
    let first = candidates.first().ok_or(Error::NoInterface)?;

    let chosen = preferred
        .and_then(|address| candidates.iter().find(|iface| iface.address == address))
        .unwrap_or(first);

    Ok(NetworkIdentity::from(chosen))
}

/// Determine this process's identity from the host's interfaces.
///
/// Fails with [`Error::NoInterface`] when no non-loopback IPv4 interface exists.
pub fn select_identity(preferred: Option<Ipv4Addr>) -> Result<NetworkIdentity> {
    let identity = choose_identity(&list_interfaces()?, preferred)?;
    info!(
        "Selected network {} ({})",
        identity.address, identity.hardware_id
    );
    Ok(identity)
}

fn hardware_id(bytes: &[u8; 6]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, address: [u8; 4], mac: &str) -> NetworkInterface {
        NetworkInterface {
            name: name.to_string(),
            address: Ipv4Addr::from(address),
            hardware_id: mac.to_string(),
        }
    }

    #[test]
    fn test_first_interface_by_default() {
        let candidates = [
            iface("eth0", [192, 168, 1, 5], "AABBCCDDEEFF"),
            iface("wlan0", [10, 0, 0, 7], "001122334455"),
        ];
        let identity = choose_identity(&candidates, None).unwrap();
        assert_eq!(identity.address, Ipv4Addr::new(192, 168, 1, 5));
        assert_eq!(identity.hardware_id, "AABBCCDDEEFF");
    }

    #[test]
    fn test_preferred_address() {
        let candidates = [
            iface("eth0", [192, 168, 1, 5], "AABBCCDDEEFF"),
            iface("wlan0", [10, 0, 0, 7], "001122334455"),
        ];
        let identity = choose_identity(&candidates, Some(Ipv4Addr::new(10, 0, 0, 7))).unwrap();
        assert_eq!(identity.hardware_id, "001122334455");
    }

    #[test]
    fn test_unmatched_preference_falls_back_to_first() {
        let candidates = [iface("eth0", [192, 168, 1, 5], "AABBCCDDEEFF")];
        let identity = choose_identity(&candidates, Some(Ipv4Addr::new(1, 2, 3, 4))).unwrap();
        assert_eq!(identity.address, Ipv4Addr::new(192, 168, 1, 5));
    }

    #[test]
    fn test_no_interface() {
        assert_eq!(choose_identity(&[], None), Err(Error::NoInterface));
    }

    #[test]
    fn test_hardware_id_format() {
        assert_eq!(hardware_id(&[0xa8, 0xbb, 0x50, 0x0a, 0x0b, 0x0c]), "A8BB500A0B0C");
    }

    #[test]
    fn test_listed_interfaces_are_not_loopback() {
        if let Ok(interfaces) = list_interfaces() {
            assert!(interfaces.iter().all(|i| !i.address.is_loopback()));
            assert!(interfaces.iter().all(|i| i.hardware_id.len() == 12));
        }
    }
}
