//! Value types and color conversion.

mod color;
mod hsl;
mod hue_saturation;

pub use color::ColorRGBW;
pub use hue_saturation::{HueSaturation, hue_saturation_to_rgbw, rgbw_to_hue_saturation};
