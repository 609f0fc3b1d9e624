//! Color ramps for scalar overlays and magnitude-dependent strokes.
//!
//! The full legend table lives with the presentation layer; this module only
//! carries what rendering needs: ordered stops and linear interpolation.

use serde::{Deserialize, Serialize};

/// Straight (non-premultiplied) RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);
    pub const WHITE: Rgba = Rgba::new(255, 255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse "#RRGGBB" or "#RRGGBBAA".
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.trim_start_matches('#');
        let channel = |i: usize| u8::from_str_radix(s.get(i..i + 2)?, 16).ok();

        match s.len() {
            6 => Some(Rgba::new(channel(0)?, channel(2)?, channel(4)?, 255)),
            8 => Some(Rgba::new(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }

    /// Linear interpolation between two colors.
    pub fn lerp(&self, other: &Rgba, t: f64) -> Rgba {
        let t = t.clamp(0.0, 1.0);
        let lerp_u8 =
            |a: u8, b: u8| -> u8 { ((a as f64) * (1.0 - t) + (b as f64) * t).round() as u8 };

        Rgba {
            r: lerp_u8(self.r, other.r),
            g: lerp_u8(self.g, other.g),
            b: lerp_u8(self.b, other.b),
            a: lerp_u8(self.a, other.a),
        }
    }
}

/// A color stop in a ramp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    /// The data value at this stop
    pub value: f64,
    /// The color at this stop
    pub color: Rgba,
}

/// Continuous color ramp over a value domain.
///
/// Values outside the domain clamp to the end colors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorRamp {
    pub stops: Vec<ColorStop>,
}

impl ColorRamp {
    pub fn new(stops: Vec<ColorStop>) -> Result<Self, String> {
        let ramp = Self { stops };
        ramp.validate()?;
        Ok(ramp)
    }

    /// Evenly spread `colors` across `[min, max]`.
    pub fn spread(min: f64, max: f64, colors: &[Rgba]) -> Result<Self, String> {
        if colors.len() < 2 {
            return Err("Ramp must have at least 2 colors".to_string());
        }
        let step = (max - min) / (colors.len() - 1) as f64;
        Self::new(
            colors
                .iter()
                .enumerate()
                .map(|(i, &color)| ColorStop {
                    value: min + step * i as f64,
                    color,
                })
                .collect(),
        )
    }

    /// Single-color "ramp", used for fixed strokes.
    pub fn constant(color: Rgba) -> Self {
        Self {
            stops: vec![ColorStop { value: 0.0, color }],
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.stops.is_empty() {
            return Err("Ramp must have at least 1 color stop".to_string());
        }

        for i in 1..self.stops.len() {
            if self.stops[i].value <= self.stops[i - 1].value {
                return Err("Color stops must be in ascending value order".to_string());
            }
        }

        Ok(())
    }

    /// Value domain covered by the stops.
    pub fn domain(&self) -> (f64, f64) {
        match (self.stops.first(), self.stops.last()) {
            (Some(first), Some(last)) => (first.value, last.value),
            _ => (0.0, 0.0),
        }
    }

    /// Interpolate color for a given value.
    pub fn color_at(&self, value: f64) -> Rgba {
        let (first, last) = match (self.stops.first(), self.stops.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Rgba::TRANSPARENT,
        };

        if value.is_nan() {
            return Rgba::TRANSPARENT;
        }
        if value <= first.value {
            return first.color;
        }
        if value >= last.value {
            return last.color;
        }

        for pair in self.stops.windows(2) {
            let (low, high) = (&pair[0], &pair[1]);
            if value <= high.value {
                let t = (value - low.value) / (high.value - low.value);
                return low.color.lerp(&high.color, t);
            }
        }

        last.color
    }
}
