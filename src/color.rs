//! Color parsing and nearest preset matching.
//!
//! Calendar hosts render event chips with slightly different shades than the palette an event
//! was created with, so scraped colors are mapped back onto the fixed preset palette by comparing
//! them in HSL space.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An RGB color triplet.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Rgb {
        Rgb { r, g, b }
    }

    /// Converts the color to HSL. All components are in the range `[0, 1]`.
    pub fn to_hsl(self) -> Hsl {
        let r = f64::from(self.r) / 255.0;
        let g = f64::from(self.g) / 255.0;
        let b = f64::from(self.b) / 255.0;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let l = (max + min) / 2.0;

        if max == min {
            // Achromatic.
            return Hsl { h: 0.0, s: 0.0, l };
        }

        let d = max - min;
        let s = if l > 0.5 {
            d / (2.0 - max - min)
        } else {
            d / (max + min)
        };

        let h = if max == r {
            (g - b) / d + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };

        Hsl { h: h / 6.0, s, l }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Error returned when a CSS color string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported color value `{0}`")]
pub struct ParseColorError(String);

impl FromStr for Rgb {
    type Err = ParseColorError;

    /// Parses `rgb(r, g, b)`, `rgba(r, g, b, a)`, `#rrggbb` and `#rgb` notations.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseColorError(s.to_owned());

        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(err);
        }

        let args = s
            .strip_prefix("rgba(")
            .or_else(|| s.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(err)?;

        let mut channels = args.split(',').map(|part| part.trim().parse::<u8>());

        match (channels.next(), channels.next(), channels.next()) {
            (Some(Ok(r)), Some(Ok(g)), Some(Ok(b))) => Ok(Rgb::new(r, g, b)),
            _ => Err(err()),
        }
    }
}

fn parse_hex(hex: &str) -> Option<Rgb> {
    if !hex.is_ascii() {
        return None;
    }

    let channel = |s: &str| u8::from_str_radix(s, 16).ok();

    match hex.len() {
        6 => Some(Rgb::new(
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        )),
        3 => {
            let expand = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
            Some(Rgb::new(expand(0)?, expand(1)?, expand(2)?))
        }
        _ => None,
    }
}

/// An HSL color with all components normalized to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    pub h: f64,
    pub s: f64,
    pub l: f64,
}

impl Hsl {
    /// Weighted distance between two colors. Hue counts double, lightness counts half, which keeps
    /// rendering noise in lightness and saturation from overriding the hue.
    pub fn distance(&self, other: &Hsl) -> f64 {
        2.0 * (self.h - other.h).abs() + (self.s - other.s).abs() + 0.5 * (self.l - other.l).abs()
    }
}

/// A named color of the calendar palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresetColor {
    pub name: &'static str,
    pub rgb: Rgb,
}

/// Event colors offered by Google Calendar, in the order they appear in the color picker.
pub const CALENDAR_PRESETS: &[PresetColor] = &[
    PresetColor { name: "Tomato", rgb: Rgb::new(213, 0, 0) },
    PresetColor { name: "Flamingo", rgb: Rgb::new(230, 124, 115) },
    PresetColor { name: "Tangerine", rgb: Rgb::new(244, 81, 30) },
    PresetColor { name: "Banana", rgb: Rgb::new(246, 191, 38) },
    PresetColor { name: "Sage", rgb: Rgb::new(51, 182, 121) },
    PresetColor { name: "Basil", rgb: Rgb::new(11, 128, 67) },
    PresetColor { name: "Peacock", rgb: Rgb::new(3, 155, 229) },
    PresetColor { name: "Blueberry", rgb: Rgb::new(63, 81, 181) },
    PresetColor { name: "Lavender", rgb: Rgb::new(121, 134, 203) },
    PresetColor { name: "Grape", rgb: Rgb::new(142, 36, 170) },
    PresetColor { name: "Graphite", rgb: Rgb::new(97, 97, 97) },
    PresetColor { name: "Calendar color", rgb: Rgb::new(96, 255, 215) },
];

/// Color the host renders for events that carry no explicit color.
pub const DEFAULT_EVENT_RGB: Rgb = Rgb::new(3, 155, 229);

/// Returns the preset closest to `color`. Ties resolve to the earliest preset in `presets`.
///
/// Returns `None` only if `presets` is empty.
pub fn nearest_preset<'a>(color: Rgb, presets: &'a [PresetColor]) -> Option<&'a PresetColor> {
    let target = color.to_hsl();
    let mut best: Option<(&PresetColor, f64)> = None;

    for preset in presets {
        let distance = target.distance(&preset.rgb.to_hsl());

        // Strictly smaller, so the first of several equally distant presets wins.
        if best.map_or(true, |(_, min)| distance < min) {
            best = Some((preset, distance));
        }
    }

    best.map(|(preset, _)| preset)
}
