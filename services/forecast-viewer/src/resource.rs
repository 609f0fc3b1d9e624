//! Resource naming for forecast rasters.
//!
//! Scalar overlays live at
//! `<base>/<start>/<CODE>/<CODE>_<target>[_masked].<ext>`, the combined wind
//! raster at `<base>/<start>/UV/UV_<target>[_masked].<ext>`. Dates are
//! `YYYYMMDD`.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use forecast_common::time::format_compact;
use forecast_common::{ColorRamp, ForecastError, ForecastResult, ForecastWindow, OverlayKind, Rgba, Selection};

/// Directory and file prefix of the combined U/V raster.
pub const WIND_VECTOR_CODE: &str = "UV";

/// Suffix of rasters pre-masked to administrative boundaries.
pub const MASKED_SUFFIX: &str = "_masked";

/// How one overlay kind is named and colored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayStyle {
    pub overlay: OverlayKind,
    /// Resource code, e.g. `TMEAN`
    pub code: String,
    pub min: f64,
    pub max: f64,
    /// Hex colors spread evenly over `[min, max]`
    pub colors: Vec<String>,
}

impl OverlayStyle {
    fn new(overlay: OverlayKind, code: &str, min: f64, max: f64, colors: &[&str]) -> Self {
        Self {
            overlay,
            code: code.to_string(),
            min,
            max,
            colors: colors.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn ramp(&self) -> Result<ColorRamp, String> {
        let colors = self
            .colors
            .iter()
            .map(|c| Rgba::from_hex(c).ok_or_else(|| format!("{}: bad color {:?}", self.overlay, c)))
            .collect::<Result<Vec<_>, _>>()?;
        ColorRamp::spread(self.min, self.max, &colors).map_err(|e| format!("{}: {}", self.overlay, e))
    }

    /// Built-in styles for every overlay kind.
    pub fn defaults() -> Vec<OverlayStyle> {
        const TEMPERATURE: [&str; 6] = ["#2c7bb6", "#00a6ca", "#90eb9d", "#f9d057", "#f29e2e", "#d7191c"];
        vec![
            OverlayStyle::new(OverlayKind::TemperatureMean, "TMEAN", -20.0, 40.0, &TEMPERATURE),
            OverlayStyle::new(OverlayKind::TemperatureMin, "TMIN", -20.0, 40.0, &TEMPERATURE),
            OverlayStyle::new(OverlayKind::TemperatureMax, "TMAX", -20.0, 40.0, &TEMPERATURE),
            OverlayStyle::new(OverlayKind::Humidity, "RH", 0.0, 100.0, &["#f7fbff", "#6baed6", "#08306b"]),
            OverlayStyle::new(
                OverlayKind::Rainfall,
                "RR",
                0.0,
                50.0,
                &["#ffffff00", "#a6dba0", "#1a9850", "#2166ac", "#762a83"],
            ),
            OverlayStyle::new(OverlayKind::CloudCover, "TCC", 0.0, 100.0, &["#ffffff00", "#bdbdbd", "#525252"]),
            OverlayStyle::new(
                OverlayKind::Wind,
                "WS",
                0.0,
                30.0,
                &["#3288bd", "#66c2a5", "#e6f598", "#fdae61", "#d53e4f"],
            ),
        ]
    }
}

struct RegistryEntry {
    code: String,
    ramp: ColorRamp,
}

/// Resource codes and ramps per overlay kind.
#[derive(Default)]
pub struct OverlayRegistry {
    entries: HashMap<OverlayKind, RegistryEntry>,
}

impl OverlayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        // Built-in styles are known to be valid.
        Self::from_styles(&OverlayStyle::defaults()).unwrap_or_default()
    }

    pub fn from_styles(styles: &[OverlayStyle]) -> ForecastResult<Self> {
        let mut registry = Self::new();
        for style in styles {
            let ramp = style.ramp().map_err(ForecastError::Config)?;
            registry.register(style.overlay, &style.code, ramp);
        }
        Ok(registry)
    }

    pub fn register(&mut self, kind: OverlayKind, code: &str, ramp: ColorRamp) {
        self.entries.insert(
            kind,
            RegistryEntry {
                code: code.to_string(),
                ramp,
            },
        );
    }

    pub fn contains(&self, kind: OverlayKind) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn code(&self, kind: OverlayKind) -> ForecastResult<&str> {
        self.entry(kind).map(|e| e.code.as_str())
    }

    pub fn ramp(&self, kind: OverlayKind) -> ForecastResult<&ColorRamp> {
        self.entry(kind).map(|e| &e.ramp)
    }

    fn entry(&self, kind: OverlayKind) -> ForecastResult<&RegistryEntry> {
        self.entries
            .get(&kind)
            .ok_or_else(|| ForecastError::UnknownOverlay(kind.to_string()))
    }
}

/// What one selection needs loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourcePlan {
    /// A single scalar raster shown through `ramp`.
    Scalar { url: String, ramp: ColorRamp },
    /// The combined wind raster; the speed underlay uses `speed_ramp`.
    Wind { url: String, speed_ramp: ColorRamp },
}

impl ResourcePlan {
    pub fn url(&self) -> &str {
        match self {
            ResourcePlan::Scalar { url, .. } | ResourcePlan::Wind { url, .. } => url,
        }
    }
}

/// Turns selections into resource URLs.
pub struct ResourceResolver {
    base_url: String,
    extension: String,
    registry: OverlayRegistry,
}

impl ResourceResolver {
    pub fn new(base_url: &str, extension: &str, registry: OverlayRegistry) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            extension: extension.trim_start_matches('.').to_string(),
            registry,
        }
    }

    pub fn registry(&self) -> &OverlayRegistry {
        &self.registry
    }

    /// URL of one raster.
    pub fn raster_url(&self, code: &str, start: NaiveDate, target: NaiveDate, clip: bool) -> String {
        format!(
            "{base}/{start}/{code}/{code}_{target}{masked}.{ext}",
            base = self.base_url,
            start = format_compact(start),
            code = code,
            target = format_compact(target),
            masked = if clip { MASKED_SUFFIX } else { "" },
            ext = self.extension,
        )
    }

    /// Resolve a selection. Unregistered kinds and dates outside the run fail.
    pub fn resolve(&self, selection: &Selection) -> ForecastResult<ResourcePlan> {
        ForecastWindow::new(selection.forecast_start).check(selection.target_date)?;

        if selection.overlay.is_vector() {
            let speed_ramp = self.registry.ramp(selection.overlay)?.clone();
            let url = self.raster_url(
                WIND_VECTOR_CODE,
                selection.forecast_start,
                selection.target_date,
                selection.clip,
            );
            return Ok(ResourcePlan::Wind { url, speed_ramp });
        }

        let code = self.registry.code(selection.overlay)?;
        let url = self.raster_url(code, selection.forecast_start, selection.target_date, selection.clip);
        let ramp = self.registry.ramp(selection.overlay)?.clone();
        Ok(ResourcePlan::Scalar { url, ramp })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://forecast.test/rasters/";

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn resolver() -> ResourceResolver {
        ResourceResolver::new(BASE, ".fgrd", OverlayRegistry::with_defaults())
    }

    #[test]
    fn test_scalar_urls() {
        let r = resolver();
        let sel = Selection::new(OverlayKind::TemperatureMax, date(1), date(4), false);
        assert_eq!(
            r.resolve(&sel).unwrap().url(),
            "https://forecast.test/rasters/20240301/TMAX/TMAX_20240304.fgrd"
        );

        let sel = Selection::new(OverlayKind::Rainfall, date(1), date(1), true);
        assert_eq!(
            r.resolve(&sel).unwrap().url(),
            "https://forecast.test/rasters/20240301/RR/RR_20240301_masked.fgrd"
        );
    }

    #[test]
    fn test_wind_uses_combined_raster() {
        let sel = Selection::new(OverlayKind::Wind, date(1), date(2), true);
        match resolver().resolve(&sel).unwrap() {
            ResourcePlan::Wind { url, speed_ramp } => {
                assert_eq!(url, "https://forecast.test/rasters/20240301/UV/UV_20240302_masked.fgrd");
                assert_eq!(speed_ramp.domain(), (0.0, 30.0));
            }
            other => panic!("expected wind plan, got {:?}", other),
        }
    }

    #[test]
    fn test_default_codes() {
        let registry = OverlayRegistry::with_defaults();
        let codes: Vec<_> = OverlayKind::ALL
            .iter()
            .map(|k| registry.code(*k).unwrap().to_string())
            .collect();
        assert_eq!(codes, vec!["TMEAN", "TMIN", "TMAX", "RH", "RR", "WS", "TCC"]);
    }

    #[test]
    fn test_unregistered_overlay_fails() {
        let mut registry = OverlayRegistry::new();
        registry.register(OverlayKind::Humidity, "RH", ColorRamp::constant(Rgba::WHITE));
        let r = ResourceResolver::new(BASE, "fgrd", registry);

        let sel = Selection::new(OverlayKind::CloudCover, date(1), date(1), false);
        assert!(matches!(r.resolve(&sel), Err(ForecastError::UnknownOverlay(_))));
        let sel = Selection::new(OverlayKind::Wind, date(1), date(1), false);
        assert!(matches!(r.resolve(&sel), Err(ForecastError::UnknownOverlay(_))));
    }

    #[test]
    fn test_target_outside_window_fails() {
        let sel = Selection::new(OverlayKind::Humidity, date(1), date(20), false);
        assert!(matches!(resolver().resolve(&sel), Err(ForecastError::InvalidDate(_))));
    }

    #[test]
    fn test_bad_style_color_is_config_error() {
        let mut styles = OverlayStyle::defaults();
        styles[0].colors[0] = "blue".to_string();
        assert!(matches!(
            OverlayRegistry::from_styles(&styles),
            Err(ForecastError::Config(_))
        ));
    }
}
