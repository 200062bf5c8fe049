//! Hue and Saturation color representation, and its mapping onto RGBW.

use serde::{Deserialize, Serialize};

use super::ColorRGBW;
use super::hsl::{Hsl, hsl_to_rgb, rgb_to_hsl};

/// Lightness above which a color is rendered on the white LED channel.
const WHITE_THRESHOLD: f64 = 72.5;

/// White channel intensity corresponding to the top of the colored range.
const WHITE_MAX: f64 = 140.0;

/// Hue and Saturation on the 0-254 scale used by generalized smart-home models.
///
/// - Hue: 0-254, mapped linearly onto 0-360 degrees
/// - Saturation: 0-254, where 254 is a fully saturated color and 0 is white
///
/// Wiz bulbs have no notion of saturation. Instead, desaturated colors are
/// produced by mixing in the dedicated white LED, so converting to and from
/// [`ColorRGBW`] goes through an intermediate lightness value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HueSaturation {
    hue: u8,
    saturation: u8,
}

impl HueSaturation {
    pub const MAX: u8 = 254;

    /// Create a new HueSaturation with the given values.
    ///
    /// Returns `None` if either value is above 254.
    ///
    /// # Examples
    ///
    /// ```
    /// use wiz_lan::HueSaturation;
    ///
    /// assert!(HueSaturation::create(0, 254).is_some());
    /// assert!(HueSaturation::create(255, 10).is_none());
    /// assert!(HueSaturation::create(10, 255).is_none());
    /// ```
    pub fn create(hue: u8, saturation: u8) -> Option<Self> {
        if hue <= Self::MAX && saturation <= Self::MAX {
            Some(HueSaturation { hue, saturation })
        } else {
            None
        }
    }

    pub fn hue(&self) -> u8 {
        self.hue
    }

    pub fn saturation(&self) -> u8 {
        self.saturation
    }

    /// Convert to the four-channel color the bulb understands.
    ///
    /// # Examples
    ///
    /// ```
    /// use wiz_lan::HueSaturation;
    ///
    /// let red = HueSaturation::create(0, 254).unwrap().to_rgbw();
    /// assert_eq!((red.red, red.green, red.blue, red.white), (255, 0, 0, 0));
    /// ```
    pub fn to_rgbw(&self) -> ColorRGBW {
        hue_saturation_to_rgbw(self.hue, self.saturation)
    }
}

impl From<&ColorRGBW> for HueSaturation {
    fn from(color: &ColorRGBW) -> Self {
        rgbw_to_hue_saturation(color.red, color.green, color.blue, color.white)
    }
}

impl From<&HueSaturation> for ColorRGBW {
    fn from(hs: &HueSaturation) -> Self {
        hs.to_rgbw()
    }
}

fn hue_saturation_to_hsl(hue: u8, saturation: u8) -> Hsl {
    let hue = f64::from(hue);
    let saturation = f64::from(saturation.min(HueSaturation::MAX));
    Hsl {
        h: (360.0 * hue / 254.0).clamp(0.0, 360.0),
        s: 100.0,
        l: 100.0 - saturation / 254.0 * 50.0,
    }
}

/// Map a 0-254 hue/saturation pair onto red, green, blue and white channels.
///
/// Colors lighter than the white threshold are near-white: the white channel
/// is pinned at 140 and the color channels carry only a faint tint. This
/// branch uses the raw 0-254 hue as degrees and is not inverted exactly by
/// [`rgbw_to_hue_saturation`]; that loss mirrors how the bulb drives its
/// white LED.
///
/// # Examples
///
/// ```
/// use wiz_lan::hue_saturation_to_rgbw;
///
/// let white = hue_saturation_to_rgbw(0, 0);
/// assert_eq!(white.white, 140);
/// ```
pub fn hue_saturation_to_rgbw(hue: u8, saturation: u8) -> ColorRGBW {
    let hsl = hue_saturation_to_hsl(hue, saturation);

    if hsl.l > WHITE_THRESHOLD {
        let (r, g, b) = hsl_to_rgb(Hsl {
            h: f64::from(hue),
            s: hsl.s,
            l: 100.0 - hsl.l,
        });
        return ColorRGBW::new(r, g, b, WHITE_MAX as u8);
    }

    let white = ((hsl.l - 50.0) / 22.5 * WHITE_MAX)
        .round()
        .clamp(0.0, 255.0) as u8;
    let (r, g, b) = hsl_to_rgb(hsl);
    ColorRGBW::new(r, g, b, white)
}

/// Recover a 0-254 hue/saturation pair from red, green, blue and white channels.
///
/// # Examples
///
/// ```
/// use wiz_lan::rgbw_to_hue_saturation;
///
/// let hs = rgbw_to_hue_saturation(0, 255, 0, 0);
/// assert_eq!((hs.hue(), hs.saturation()), (85, 254));
/// ```
pub fn rgbw_to_hue_saturation(red: u8, green: u8, blue: u8, white: u8) -> HueSaturation {
    let hsl = rgb_to_hsl(red, green, blue);
    let white = f64::from(white);
    let lightness = if white < WHITE_MAX {
        50.0 + white / WHITE_MAX * 22.5
    } else {
        100.0 - hsl.l
    };

    let hue = (254.0 * hsl.h / 360.0).round().clamp(0.0, 254.0) as u8;
    let saturation = ((100.0 - lightness.clamp(50.0, 100.0)) / 50.0 * 254.0).round() as u8;
    HueSaturation { hue, saturation }
}
