//! Wind vector quantity.

use serde::{Deserialize, Serialize};

/// Immutable (u, v) wind components in m/s.
///
/// `u` is the eastward component, `v` the northward component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    pub u: f64,
    pub v: f64,
}

impl Vector {
    pub const fn new(u: f64, v: f64) -> Self {
        Self { u, v }
    }

    /// Speed: `sqrt(u² + v²)`.
    pub fn magnitude(&self) -> f64 {
        self.u.hypot(self.v)
    }

    /// Direction the flow is heading to, degrees clockwise from north.
    pub fn direction_to(&self) -> f64 {
        let degrees = self.u.atan2(self.v).to_degrees();
        (degrees + 360.0) % 360.0
    }

    /// Direction the wind is blowing from (meteorological convention).
    pub fn direction_from(&self) -> f64 {
        (self.direction_to() + 180.0) % 360.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude() {
        assert_eq!(Vector::new(3.0, 4.0).magnitude(), 5.0);
        assert_eq!(Vector::new(0.0, 0.0).magnitude(), 0.0);
        assert_eq!(Vector::new(-3.0, -4.0).magnitude(), 5.0);
    }

    #[test]
    fn test_directions() {
        // Southerly wind: blowing towards the north, from the south
        let southerly = Vector::new(0.0, 5.0);
        assert!((southerly.direction_to() - 0.0).abs() < 1e-9);
        assert!((southerly.direction_from() - 180.0).abs() < 1e-9);

        // Westerly wind: blowing towards the east
        let westerly = Vector::new(5.0, 0.0);
        assert!((westerly.direction_to() - 90.0).abs() < 1e-9);
        assert!((westerly.direction_from() - 270.0).abs() < 1e-9);
    }
}
