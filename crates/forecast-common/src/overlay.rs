//! Overlay kinds and the selection that drives what gets loaded.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ForecastError;

/// A supported weather parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    TemperatureMean,
    TemperatureMin,
    TemperatureMax,
    Humidity,
    Rainfall,
    Wind,
    CloudCover,
}

impl OverlayKind {
    pub const ALL: [OverlayKind; 7] = [
        OverlayKind::TemperatureMean,
        OverlayKind::TemperatureMin,
        OverlayKind::TemperatureMax,
        OverlayKind::Humidity,
        OverlayKind::Rainfall,
        OverlayKind::Wind,
        OverlayKind::CloudCover,
    ];

    /// Stable identifier used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayKind::TemperatureMean => "temperature_mean",
            OverlayKind::TemperatureMin => "temperature_min",
            OverlayKind::TemperatureMax => "temperature_max",
            OverlayKind::Humidity => "humidity",
            OverlayKind::Rainfall => "rainfall",
            OverlayKind::Wind => "wind",
            OverlayKind::CloudCover => "cloud_cover",
        }
    }

    /// Whether this overlay is backed by the combined U/V vector raster.
    pub fn is_vector(&self) -> bool {
        matches!(self, OverlayKind::Wind)
    }

    /// Display units of the scalar values.
    pub fn units(&self) -> &'static str {
        match self {
            OverlayKind::TemperatureMean
            | OverlayKind::TemperatureMin
            | OverlayKind::TemperatureMax => "°C",
            OverlayKind::Humidity | OverlayKind::CloudCover => "%",
            OverlayKind::Rainfall => "mm",
            OverlayKind::Wind => "m/s",
        }
    }
}

impl fmt::Display for OverlayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverlayKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        OverlayKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ForecastError::UnknownOverlay(s.to_string()))
    }
}

/// The tuple of chosen parameters determining what to load and render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    pub overlay: OverlayKind,
    /// First day of the forecast run
    pub forecast_start: NaiveDate,
    /// Day being displayed
    pub target_date: NaiveDate,
    /// Whether the served raster is pre-masked to administrative boundaries
    pub clip: bool,
}

impl Selection {
    pub fn new(
        overlay: OverlayKind,
        forecast_start: NaiveDate,
        target_date: NaiveDate,
        clip: bool,
    ) -> Self {
        Self {
            overlay,
            forecast_start,
            target_date,
            clip,
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}/{}{}",
            self.overlay,
            self.forecast_start.format("%Y%m%d"),
            self.target_date.format("%Y%m%d"),
            if self.clip { "+clip" } else { "" }
        )
    }
}
