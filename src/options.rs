//! Configuration input for the LAN engine.

use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

/// Port devices push state reports to.
pub const LISTEN_PORT: u16 = 38900;

/// Port devices listen on; also the source port of everything this process sends.
pub const DEVICE_PORT: u16 = 38899;

/// Settings for a [`crate::LanComm`].
///
/// Every field has a default, so an empty JSON object is a valid configuration.
///
/// # Examples
///
/// ```
/// use std::net::Ipv4Addr;
/// use wiz_lan::LanOptions;
///
/// let options: LanOptions = serde_json::from_str(r#"{"bindTo": "192.168.1.5"}"#).unwrap();
/// assert_eq!(options.bind_to, Some(Ipv4Addr::new(192, 168, 1, 5)));
/// assert_eq!(options.listen_port, 38900);
/// ```
#[serde_as]
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LanOptions {
    /// Preferred local address used to pick this process's identity
    pub bind_to: Option<Ipv4Addr>,
    pub listen_port: u16,
    pub broadcast_port: u16,
    /// Destination port of every datagram sent to devices
    pub device_port: u16,
    pub broadcast_address: Ipv4Addr,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "heartbeatIntervalMs")]
    pub heartbeat_interval: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "addressInUseRetryMs")]
    pub address_in_use_retry: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "reopenDelayMs")]
    pub reopen_delay: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "bindPollIntervalMs")]
    pub bind_poll_interval: Duration,
}

impl Default for LanOptions {
    fn default() -> Self {
        LanOptions {
            bind_to: None,
            listen_port: LISTEN_PORT,
            broadcast_port: DEVICE_PORT,
            device_port: DEVICE_PORT,
            broadcast_address: Ipv4Addr::BROADCAST,
            heartbeat_interval: Duration::from_secs(24),
            address_in_use_retry: Duration::from_secs(15),
            reopen_delay: Duration::from_secs(1),
            bind_poll_interval: Duration::from_millis(100),
        }
    }
}

/// Options for [`crate::LanComm::start`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOptions {
    /// Forget known devices and drop subscribers before starting
    pub clear: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_config_uses_defaults() {
        let options: LanOptions = serde_json::from_value(json!({})).unwrap();
        assert_eq!(options, LanOptions::default());
        assert_eq!(options.broadcast_port, 38899);
        assert_eq!(options.heartbeat_interval, Duration::from_secs(24));
    }

    #[test]
    fn test_durations_in_milliseconds() {
        let options: LanOptions = serde_json::from_value(json!({
            "heartbeatIntervalMs": 5000,
            "addressInUseRetryMs": 250,
        }))
        .unwrap();
        assert_eq!(options.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(options.address_in_use_retry, Duration::from_millis(250));
        assert_eq!(options.reopen_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_serialize_round_trip() {
        let options = LanOptions {
            bind_to: Some(Ipv4Addr::new(10, 0, 0, 3)),
            ..LanOptions::default()
        };
        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(value["bindTo"], "10.0.0.3");
        assert_eq!(value["reopenDelayMs"], 1000);
        let back: LanOptions = serde_json::from_value(value).unwrap();
        assert_eq!(back, options);
    }
}
