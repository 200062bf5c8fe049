//! RGBW color representation.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::status::DeviceState;

/// An RGBW color (RGB + white LED channel, 0-255 each).
///
/// This is the only color model the bulbs speak. The four channels are
/// meaningful only together, so state reports always carry all of them.
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ColorRGBW {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub white: u8,
}

impl ColorRGBW {
    pub fn new(red: u8, green: u8, blue: u8, white: u8) -> Self {
        Self {
            red,
            green,
            blue,
            white,
        }
    }

    /// Read the `r`, `g`, `b`, `w` attributes out of a state report.
    ///
    /// Returns `None` unless all four channels are present and in range.
    pub fn from_state(state: &DeviceState) -> Option<Self> {
        let channel = |key: &str| {
            state
                .get(key)
                .and_then(|v| v.as_u64())
                .and_then(|v| u8::try_from(v).ok())
        };
        Some(Self::new(
            channel("r")?,
            channel("g")?,
            channel("b")?,
            channel("w")?,
        ))
    }
}

impl FromStr for ColorRGBW {
    type Err = String;

    /// Parse from comma-separated string (e.g., "255,128,0,40").
    fn from_str(s: &str) -> Result<Self, String> {
        let parts: Vec<u8> = s
            .split(',')
            .map(|c| c.trim().parse().map_err(|_| format!("invalid channel {c:?}")))
            .collect::<Result<_, _>>()?;
        if parts.len() == 4 {
            Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
        } else {
            Err("Expected format: r,g,b,w".into())
        }
    }
}
