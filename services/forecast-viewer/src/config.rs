//! Viewer configuration.
//!
//! Loaded from an optional YAML file, then overridden from environment
//! variables, then validated.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use forecast_common::Rgba;
use renderer::{ParticleConfig, StrokeColor, StrokeWidth};
use storage::{RasterBackend, RasterStoreConfig};

use crate::resource::OverlayStyle;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub store: RasterStoreConfig,
    /// File extension of served rasters
    pub extension: String,
    pub cache: CacheConfig,
    /// Concurrent background decodes
    pub max_concurrent_decodes: usize,
    pub map: MapConfig,
    pub particles: ParticleSettings,
    pub overlays: Vec<OverlayStyle>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            store: RasterStoreConfig::default(),
            extension: "fgrd".to_string(),
            cache: CacheConfig::default(),
            max_concurrent_decodes: 2,
            map: MapConfig::default(),
            particles: ParticleSettings::default(),
            overlays: OverlayStyle::defaults(),
        }
    }
}

/// Where cache entries are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheBackend {
    File { dir: PathBuf },
    Memory { capacity: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::File {
                dir: PathBuf::from("./cache/forecast"),
            },
            ttl_secs: 24 * 60 * 60,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub width: u32,
    pub height: u32,
    /// `[lon, lat]`
    pub center: [f64; 2],
    pub zoom: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            center: [21.0, 42.0],
            zoom: 6.0,
        }
    }
}

/// Particle animation knobs as they appear in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleSettings {
    pub paths: usize,
    pub max_age: u32,
    pub fade: f32,
    pub width: f32,
    /// Maximum stroke width; strokes scale with wind speed when set
    pub max_width: Option<f32>,
    pub color: String,
    pub velocity_scale: f64,
    pub period_ms: u64,
    pub seed: Option<u64>,
}

impl Default for ParticleSettings {
    fn default() -> Self {
        let particles = ParticleConfig::default();
        Self {
            paths: particles.paths,
            max_age: particles.max_age,
            fade: particles.fade,
            width: 1.0,
            max_width: None,
            color: "#ffffff".to_string(),
            velocity_scale: particles.velocity_scale,
            period_ms: particles.period.as_millis() as u64,
            seed: None,
        }
    }
}

impl ParticleSettings {
    pub fn to_particle_config(&self) -> Result<ParticleConfig, String> {
        let color = Rgba::from_hex(&self.color).ok_or_else(|| format!("bad particle color {:?}", self.color))?;
        let width = match self.max_width {
            Some(max) => StrokeWidth::ByMagnitude { min: self.width, max },
            None => StrokeWidth::Fixed(self.width),
        };

        let config = ParticleConfig {
            paths: self.paths,
            max_age: self.max_age,
            fade: self.fade,
            width,
            color: StrokeColor::Fixed(color),
            velocity_scale: self.velocity_scale,
            period: Duration::from_millis(self.period_ms),
            zoom_tuning: None,
            seed: self.seed,
        };
        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }
}

impl ViewerConfig {
    /// Read a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: ViewerConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// File (or defaults), then environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

        info!(
            base_url = %config.store.base_url,
            ttl_secs = config.cache.ttl_secs,
            decoders = config.max_concurrent_decodes,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Defaults overridden from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("FORECAST_BASE_URL") {
            self.store.base_url = val;
        }

        if let Ok(val) = std::env::var("FORECAST_RASTER_DIR") {
            self.store.backend = RasterBackend::Local { root: PathBuf::from(val) };
        }

        if let Ok(val) = std::env::var("FORECAST_CACHE_DIR") {
            self.cache.backend = CacheBackend::File { dir: PathBuf::from(val) };
        }

        if let Ok(val) = std::env::var("FORECAST_CACHE_TTL_SECS") {
            if let Ok(ttl) = val.parse() {
                self.cache.ttl_secs = ttl;
            }
        }

        if let Ok(val) = std::env::var("FORECAST_MAX_DECODES") {
            if let Ok(n) = val.parse() {
                self.max_concurrent_decodes = n;
            }
        }

        if let Ok(val) = std::env::var("FORECAST_PARTICLE_PATHS") {
            if let Ok(n) = val.parse() {
                self.particles.paths = n;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.store.base_url.trim().is_empty() {
            return Err("store.base_url must not be empty".to_string());
        }

        if self.extension.trim_start_matches('.').is_empty() {
            return Err("extension must not be empty".to_string());
        }

        if self.cache.ttl_secs == 0 {
            return Err("cache.ttl_secs must be > 0".to_string());
        }

        if let CacheBackend::Memory { capacity: 0 } = self.cache.backend {
            return Err("cache.backend.capacity must be > 0".to_string());
        }

        if self.max_concurrent_decodes == 0 {
            return Err("max_concurrent_decodes must be > 0".to_string());
        }

        if self.map.width == 0 || self.map.height == 0 {
            return Err("map width and height must be > 0".to_string());
        }

        self.particles.to_particle_config()?;
        for style in &self.overlays {
            style.ramp()?;
        }

        Ok(())
    }
}
