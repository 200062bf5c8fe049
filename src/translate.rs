//! Conversions between bulb attributes and the scales used by generalized
//! smart-home models (0-254 levels, mireds, 0-254 hue and saturation).

use serde::{Deserialize, Serialize};

use crate::status::DeviceState;
use crate::types::{ColorRGBW, HueSaturation, hue_saturation_to_rgbw, rgbw_to_hue_saturation};

/// Top of the 0-254 level scale.
pub const LEVEL_MAX: u8 = 254;

/// Mired range accepted by generalized color temperature controls.
pub const MIREDS_RANGE: (u16, u16) = (147, 500);

/// Kelvin range the bulbs accept.
pub const KELVIN_RANGE: (u16, u16) = (2200, 6500);

/// Bulb dimming percent (0-100) to a 0-254 level.
///
/// ```
/// assert_eq!(wiz_lan::translate::dimming_to_level(50), 127);
/// assert_eq!(wiz_lan::translate::dimming_to_level(100), 254);
/// ```
pub fn dimming_to_level(percent: u8) -> u8 {
    let percent = f64::from(percent.min(100));
    (f64::from(LEVEL_MAX) * percent / 100.0).round() as u8
}

/// A 0-254 level to bulb dimming percent.
pub fn level_to_dimming(level: u8) -> u8 {
    let level = f64::from(level.min(LEVEL_MAX));
    (100.0 * level / f64::from(LEVEL_MAX)).round() as u8
}

/// Color temperature in kelvin to mireds, clamped to [`MIREDS_RANGE`].
pub fn kelvin_to_mireds(kelvin: u16) -> u16 {
    reciprocal(kelvin, MIREDS_RANGE)
}

/// Mireds to a color temperature in kelvin, clamped to [`KELVIN_RANGE`].
///
/// ```
/// use wiz_lan::translate::mireds_to_kelvin;
///
/// assert_eq!(mireds_to_kelvin(250), 4000);
/// assert_eq!(mireds_to_kelvin(1000), 2200);
/// ```
pub fn mireds_to_kelvin(mireds: u16) -> u16 {
    reciprocal(mireds, KELVIN_RANGE)
}

fn reciprocal(value: u16, (min, max): (u16, u16)) -> u16 {
    if value == 0 {
        return max;
    }
    (1e6 / f64::from(value))
        .round()
        .clamp(f64::from(min), f64::from(max)) as u16
}

/// Change only the hue of the last color a device reported.
pub fn hue_only(hue: u8, last: &ColorRGBW) -> ColorRGBW {
    let current = HueSaturation::from(last);
    hue_saturation_to_rgbw(hue, current.saturation())
}

/// Change only the saturation of the last color a device reported.
pub fn saturation_only(saturation: u8, last: &ColorRGBW) -> ColorRGBW {
    let current = HueSaturation::from(last);
    hue_saturation_to_rgbw(current.hue(), saturation)
}

/// The attributes of a state report on generalized scales.
///
/// Fields are `None` when the report did not carry the underlying attribute.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeAttributes {
    pub on_off: Option<bool>,
    pub level: Option<u8>,
    pub color_temperature_mireds: Option<u16>,
    pub hue: Option<u8>,
    pub saturation: Option<u8>,
}

impl BridgeAttributes {
    /// Translate a full state or a set of changes.
    ///
    /// ```
    /// use serde_json::json;
    /// use wiz_lan::DeviceState;
    /// use wiz_lan::translate::BridgeAttributes;
    ///
    /// let state = DeviceState::try_from(json!({"state": true, "dimming": 100})).unwrap();
    /// let attrs = BridgeAttributes::from_state(&state);
    /// assert_eq!(attrs.on_off, Some(true));
    /// assert_eq!(attrs.level, Some(254));
    /// assert_eq!(attrs.hue, None);
    /// ```
    pub fn from_state(state: &DeviceState) -> Self {
        let channel = |key: &str| {
            state
                .get(key)
                .and_then(|v| v.as_u64())
                .map(|v| v.min(255) as u8)
        };

        let hs = match (channel("r"), channel("g"), channel("b")) {
            (Some(r), Some(g), Some(b)) => {
                Some(rgbw_to_hue_saturation(r, g, b, channel("w").unwrap_or(0)))
            }
            _ => None,
        };

        BridgeAttributes {
            on_off: state.is_on(),
            level: state.dimming().map(dimming_to_level),
            color_temperature_mireds: state.temp().map(kelvin_to_mireds),
            hue: hs.map(|hs| hs.hue()),
            saturation: hs.map(|hs| hs.saturation()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dimming_level_scales() {
        assert_eq!(dimming_to_level(0), 0);
        assert_eq!(dimming_to_level(10), 25);
        assert_eq!(dimming_to_level(100), 254);
        assert_eq!(dimming_to_level(200), 254);

        assert_eq!(level_to_dimming(0), 0);
        assert_eq!(level_to_dimming(127), 50);
        assert_eq!(level_to_dimming(254), 100);
        assert_eq!(level_to_dimming(255), 100);
    }

    #[test]
    fn test_color_temperature_clamps() {
        assert_eq!(kelvin_to_mireds(4000), 250);
        assert_eq!(kelvin_to_mireds(6500), 154);
        assert_eq!(kelvin_to_mireds(10000), 147);
        assert_eq!(kelvin_to_mireds(1000), 500);
        assert_eq!(kelvin_to_mireds(0), 500);

        assert_eq!(mireds_to_kelvin(154), 6494);
        assert_eq!(mireds_to_kelvin(147), 6500);
        assert_eq!(mireds_to_kelvin(500), 2200);
        assert_eq!(mireds_to_kelvin(0), 6500);
    }

    #[test]
    fn test_hue_only_keeps_saturation() {
        let last = hue_saturation_to_rgbw(0, 200);
        let updated = hue_only(85, &last);
        let hs = HueSaturation::from(&updated);
        assert_eq!((hs.hue(), hs.saturation()), (85, 200));
    }

    #[test]
    fn test_saturation_only_keeps_hue() {
        let last = hue_saturation_to_rgbw(170, 254);
        let updated = saturation_only(180, &last);
        let hs = HueSaturation::from(&updated);
        assert_eq!((hs.hue(), hs.saturation()), (170, 180));
    }

    #[test]
    fn test_bridge_attributes_from_report() {
        let state = DeviceState::try_from(json!({
            "state": false,
            "temp": 2700,
            "r": 0,
            "g": 255,
            "b": 0,
            "w": 0,
        }))
        .unwrap();
        let attrs = BridgeAttributes::from_state(&state);
        assert_eq!(
            attrs,
            BridgeAttributes {
                on_off: Some(false),
                level: None,
                color_temperature_mireds: Some(370),
                hue: Some(85),
                saturation: Some(254),
            }
        );
    }
}
