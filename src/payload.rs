//! Wire messages exchanged with Wiz devices.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::errors::Error;
use crate::network::NetworkIdentity;
use crate::types::{ColorRGBW, HueSaturation};

type Result<T> = std::result::Result<T, Error>;

/// Source tag attached to every `setPilot` command.
const SOURCE_TAG: &str = "mb";

/// Attribute changes to send to a device with `setPilot`.
///
/// # Examples
///
/// ```
/// use wiz_lan::{ColorRGBW, Payload};
///
/// let mut payload = Payload::new();
/// payload.on(true).dimming(80);
/// assert!(payload.is_valid());
///
/// let payload = Payload::from(&ColorRGBW::new(255, 0, 0, 0));
/// assert!(payload.is_valid());
/// ```
#[serde_with::skip_serializing_none]
#[derive(Default, Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Payload {
    pub(crate) state: Option<bool>,
    pub(crate) dimming: Option<u8>,
    pub(crate) temp: Option<u16>,
    #[serde(rename = "sceneId")]
    pub(crate) scene: Option<u16>,
    pub(crate) speed: Option<u8>,
    #[serde(rename = "r")]
    pub(crate) red: Option<u8>,
    #[serde(rename = "g")]
    pub(crate) green: Option<u8>,
    #[serde(rename = "b")]
    pub(crate) blue: Option<u8>,
    #[serde(rename = "w")]
    pub(crate) white: Option<u8>,
    #[serde(rename = "c")]
    pub(crate) cool: Option<u8>,
}

impl Payload {
    /// Create a new empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if this payload contains at least one attribute.
    ///
    /// Speed alone is not valid; it only applies together with a scene.
    pub fn is_valid(&self) -> bool {
        self.state.is_some()
            || self.dimming.is_some()
            || self.temp.is_some()
            || self.scene.is_some()
            || self.get_color().is_some()
            || self.cool.is_some()
    }

    pub fn on(&mut self, on: bool) -> &mut Self {
        self.state = Some(on);
        self
    }

    /// Set the dimming level in percent.
    pub fn dimming(&mut self, dimming: u8) -> &mut Self {
        self.dimming = Some(dimming);
        self
    }

    /// Set the color temperature in kelvin.
    pub fn temp(&mut self, kelvin: u16) -> &mut Self {
        self.temp = Some(kelvin);
        self
    }

    pub fn scene(&mut self, scene_id: u16) -> &mut Self {
        self.scene = Some(scene_id);
        self
    }

    pub fn speed(&mut self, speed: u8) -> &mut Self {
        self.speed = Some(speed);
        self
    }

    /// Set all four color channels.
    pub fn color(&mut self, color: &ColorRGBW) -> &mut Self {
        self.red = Some(color.red);
        self.green = Some(color.green);
        self.blue = Some(color.blue);
        self.white = Some(color.white);
        self
    }

    pub fn cool(&mut self, cool: u8) -> &mut Self {
        self.cool = Some(cool);
        self
    }

    pub fn get_color(&self) -> Option<ColorRGBW> {
        Some(ColorRGBW::new(
            self.red?,
            self.green?,
            self.blue?,
            self.white?,
        ))
    }
}

impl From<&ColorRGBW> for Payload {
    /// A color command, which also turns the device on.
    fn from(color: &ColorRGBW) -> Self {
        let mut payload = Payload::new();
        payload.on(true).color(color);
        payload
    }
}

impl From<&HueSaturation> for Payload {
    fn from(hs: &HueSaturation) -> Self {
        Payload::from(&hs.to_rgbw())
    }
}

/// Presence announcement that makes devices report to this process.
pub(crate) fn registration(identity: &NetworkIdentity, register: bool) -> Value {
    json!({
        "method": "registration",
        "params": {
            "register": register,
            "phoneMac": identity.hardware_id,
            "phoneIp": identity.address.to_string(),
        }
    })
}

pub(crate) fn get_system_config() -> Value {
    json!({"method": "getSystemConfig", "params": {}})
}

pub(crate) fn get_pilot() -> Value {
    json!({"method": "getPilot", "params": {}})
}

pub(crate) fn set_pilot(payload: &Payload) -> Result<Value> {
    let mut params = Map::new();
    params.insert("src".to_string(), json!(SOURCE_TAG));
    if let Value::Object(fields) = serde_json::to_value(payload).map_err(Error::JsonDump)? {
        params.extend(fields);
    }
    Ok(json!({
        "method": "setPilot",
        "env": "pro",
        "params": params,
    }))
}

/// An incoming datagram, reduced to what the sync engine looks at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Inbound {
    pub method: String,
    /// Hardware id from the payload, normalized.
    pub mac: Option<String>,
    /// `result` if present, `params` otherwise.
    pub payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct RawInbound {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    params: Option<Value>,
}

impl Inbound {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = String::from_utf8(data.to_vec()).map_err(Error::Utf8Decode)?;
        let raw: RawInbound = serde_json::from_str(&text).map_err(Error::JsonLoad)?;

        let payload = match (raw.result, raw.params) {
            (Some(Value::Object(result)), _) => Some(result),
            (_, Some(Value::Object(params))) => Some(params),
            _ => None,
        };
        let mac = payload
            .as_ref()
            .and_then(|p| p.get("mac"))
            .and_then(Value::as_str)
            .map(normalize_mac);

        Ok(Inbound {
            method: raw.method.unwrap_or_default(),
            mac,
            payload,
        })
    }
}

/// Uppercase, delimiter-free hex form of a hardware address.
///
/// ```
/// assert_eq!(wiz_lan::normalize_mac("a8:bb:50:0a:0b:0c"), "A8BB500A0B0C");
/// ```
pub fn normalize_mac(mac: &str) -> String {
    mac.chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
